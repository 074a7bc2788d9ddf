use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use common::characters::CanSign;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{endpoint, ControlError, Envelope, Payload};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct GrantRequest {
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
    /// Fragments issued, one per node
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
pub struct GrantResponse {
    /// Treasure map encrypted for Bob (base64)
    pub treasure_map: String,
    pub policy_encrypting_key: String,
    pub alice_signing_key: String,
    pub label: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Payload(req): Payload<GrantRequest>,
) -> Result<impl IntoResponse, ControlError> {
    let params = super::policy_params(
        &req.bob_encrypting_key,
        &req.bob_signing_key,
        &req.label,
        req.m,
        req.n,
        req.expiration_time,
    )?;

    let alice = state.alice();
    let enacted = alice.grant(&params).await?;

    Ok(Envelope::new(GrantResponse {
        treasure_map: enacted.treasure_map.to_base64(),
        policy_encrypting_key: enacted.policy.policy_key.to_hex(),
        alice_signing_key: alice.stamp().to_hex(),
        label: enacted.policy.label,
    }))
}

impl ApiRequest for GrantRequest {
    type Response = GrantResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .put(endpoint(base_url, "/api/v0/alice/grant"))
            .json(&self)
    }
}
