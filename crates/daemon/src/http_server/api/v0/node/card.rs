use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{endpoint, ControlError, Envelope};
use crate::ServiceState;

/// This node's signed metadata, for other nodes' `teachers` lists.
#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct CardRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardResponse {
    pub node: String,
    pub card: String,
}

pub async fn handler(State(state): State<ServiceState>) -> Result<impl IntoResponse, ControlError> {
    let node = state.node().ok_or(ControlError::NoNode)?;
    let metadata = node.metadata();
    Ok(Envelope::new(CardResponse {
        node: metadata.node().to_hex(),
        card: metadata.to_base64(),
    }))
}

impl ApiRequest for CardRequest {
    type Response = CardResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client.get(endpoint(base_url, "/api/v0/node/card"))
    }
}
