use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::characters::CanSign;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{
    decode_base64, encode_base64, encrypting_key, endpoint, ControlError, Envelope, Payload,
};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct EncryptMessageRequest {
    /// Plaintext (base64)
    #[arg(long)]
    pub message: String,
    /// Policy encrypting key (hex), the node's default when left out
    #[arg(long)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_encrypting_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptMessageResponse {
    pub message_kit: String,
    pub signature: String,
    /// Key Bob checks the kit against (hex)
    pub datasource_signing_key: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Payload(req): Payload<EncryptMessageRequest>,
) -> Result<impl IntoResponse, ControlError> {
    let plaintext = decode_base64("message", &req.message)?;
    let policy_key = match req.policy_encrypting_key.as_deref() {
        Some(hex) => encrypting_key("policy_encrypting_key", hex)?,
        None => *state.default_policy_key().ok_or_else(|| {
            ControlError::BadRequest(
                "policy_encrypting_key: required, no default is configured".to_string(),
            )
        })?,
    };

    let enrico = state.enrico(policy_key);
    let kit = enrico.encrypt_message(&plaintext)?;
    tracing::debug!(
        "encrypted {} bytes under {}",
        plaintext.len(),
        policy_key.to_hex()
    );

    Ok(Envelope::new(EncryptMessageResponse {
        message_kit: kit.to_base64(),
        signature: encode_base64(&kit.signature().to_bytes()),
        datasource_signing_key: enrico.stamp().to_hex(),
    }))
}

impl ApiRequest for EncryptMessageRequest {
    type Response = EncryptMessageResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(base_url, "/api/v0/enrico/encrypt_message"))
            .json(&self)
    }
}
