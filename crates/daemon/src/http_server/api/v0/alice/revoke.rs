use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{
    encrypting_key, endpoint, ControlError, Envelope, Payload,
};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct RevokeRequest {
    /// Bob's encrypting key (hex)
    #[arg(long)]
    pub bob_encrypting_key: String,
    /// Policy label
    #[arg(long)]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub label: String,
    /// Nodes that confirmed dropping their fragment (hex)
    pub revoked_nodes: Vec<String>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Payload(req): Payload<RevokeRequest>,
) -> Result<impl IntoResponse, ControlError> {
    let bob = encrypting_key("bob_encrypting_key", &req.bob_encrypting_key)?;
    let revoked = state.alice().revoke(&bob, &req.label).await?;

    Ok(Envelope::new(RevokeResponse {
        label: req.label,
        revoked_nodes: revoked.iter().map(|node| node.to_hex()).collect(),
    }))
}

impl ApiRequest for RevokeRequest {
    type Response = RevokeResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .delete(endpoint(base_url, "/api/v0/alice/revoke"))
            .json(&self)
    }
}
