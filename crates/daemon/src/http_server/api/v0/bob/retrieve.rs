use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::policy::MessageKit;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{
    encode_base64, encrypting_key, endpoint, one_or_many, public_key, ControlError, Envelope,
    Payload,
};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct RetrieveRequest {
    /// Policy label
    #[arg(long)]
    pub label: String,
    /// Policy encrypting key (hex)
    #[arg(long)]
    pub policy_encrypting_key: String,
    /// Alice's signing key (hex)
    #[arg(long)]
    pub alice_signing_key: String,
    /// Message kits to open (base64), repeat for several
    #[arg(long = "message-kit", required = true)]
    #[serde(rename = "message_kit", deserialize_with = "one_or_many")]
    pub message_kits: Vec<String>,
    /// Enrico's signing key (hex)
    #[arg(long)]
    pub datasource_signing_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResponse {
    /// One plaintext per kit, in request order (base64)
    pub plaintext: Vec<String>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Payload(req): Payload<RetrieveRequest>,
) -> Result<impl IntoResponse, ControlError> {
    let policy_key = encrypting_key("policy_encrypting_key", &req.policy_encrypting_key)?;
    let alice = public_key("alice_signing_key", &req.alice_signing_key)?;
    let data_source = public_key("datasource_signing_key", &req.datasource_signing_key)?;
    if req.message_kits.is_empty() {
        return Err(ControlError::BadRequest(
            "message_kit: at least one kit is required".to_string(),
        ));
    }
    let kits = req
        .message_kits
        .iter()
        .map(|kit| MessageKit::from_base64(kit))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ControlError::BadRequest(format!("message_kit: {e}")))?;

    let plaintexts = state
        .bob()
        .retrieve(&req.label, &alice, &policy_key, &data_source, &kits)
        .await?;

    Ok(Envelope::new(RetrieveResponse {
        plaintext: plaintexts.iter().map(|p| encode_base64(p)).collect(),
    }))
}

impl ApiRequest for RetrieveRequest {
    type Response = RetrieveResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(base_url, "/api/v0/bob/retrieve"))
            .json(&self)
    }
}
