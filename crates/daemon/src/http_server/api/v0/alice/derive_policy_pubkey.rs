use axum::extract::{Path, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{endpoint, ControlError, Envelope};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct DerivePolicyPubkeyRequest {
    /// Policy label
    #[arg(long)]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivePolicyPubkeyResponse {
    pub label: String,
    pub policy_encrypting_key: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(label): Path<String>,
) -> Result<impl IntoResponse, ControlError> {
    let policy_key = state.alice().derive_policy_pubkey(&label);
    Ok(Envelope::new(DerivePolicyPubkeyResponse {
        label,
        policy_encrypting_key: policy_key.to_hex(),
    }))
}

impl ApiRequest for DerivePolicyPubkeyRequest {
    type Response = DerivePolicyPubkeyResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let mut url = endpoint(base_url, "/api/v0/alice/derive_policy_pubkey");
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(&self.label);
        }
        client.post(url)
    }
}
