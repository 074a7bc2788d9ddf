use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::discovery::NodeDiscovery;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{endpoint, ControlError, Envelope};
use crate::ServiceState;

/// Drop every learned node. Teachers are kept.
#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct ForgetNodesRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetNodesResponse {
    pub forgotten: usize,
}

pub async fn handler(State(state): State<ServiceState>) -> Result<impl IntoResponse, ControlError> {
    let forgotten = state.registry().forget_all();
    Ok(Envelope::new(ForgetNodesResponse { forgotten }))
}

impl ApiRequest for ForgetNodesRequest {
    type Response = ForgetNodesResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client.delete(endpoint(base_url, "/api/v0/node/known_nodes"))
    }
}
