use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{endpoint, ControlError, Envelope, Payload};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct CreatePolicyRequest {
    /// Bob's encrypting key (hex)
    #[arg(long)]
    pub bob_encrypting_key: String,
    /// Bob's signing key (hex)
    #[arg(long)]
    pub bob_signing_key: String,
    /// Policy label
    #[arg(long)]
    pub label: String,
    /// Fragments needed to re-encrypt
    #[arg(short = 'm', long)]
    pub m: usize,
    /// Fragments issued
    #[arg(short = 'n', long)]
    pub n: usize,
    /// RFC 3339 expiration
    #[arg(long, value_parser = super::parse_rfc3339)]
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration_time: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePolicyResponse {
    pub label: String,
    pub policy_encrypting_key: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Payload(req): Payload<CreatePolicyRequest>,
) -> Result<impl IntoResponse, ControlError> {
    let params = super::policy_params(
        &req.bob_encrypting_key,
        &req.bob_signing_key,
        &req.label,
        req.m,
        req.n,
        req.expiration_time,
    )?;
    let policy = state.alice().create_policy(&params)?;
    tracing::info!("created {}-of-{} policy {:?}", req.m, req.n, req.label);

    Ok(Envelope::new(CreatePolicyResponse {
        label: policy.label,
        policy_encrypting_key: policy.policy_key.to_hex(),
    }))
}

// Client implementation - builds request for this operation
impl ApiRequest for CreatePolicyRequest {
    type Response = CreatePolicyResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .put(endpoint(base_url, "/api/v0/alice/create_policy"))
            .json(&self)
    }
}
