use std::net::SocketAddr;

use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::discovery::NodeDiscovery;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{endpoint, ControlError, Envelope};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct KnownNodesRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownNode {
    pub node: String,
    pub addresses: Vec<SocketAddr>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownNodesResponse {
    pub nodes: Vec<KnownNode>,
}

pub async fn handler(State(state): State<ServiceState>) -> Result<impl IntoResponse, ControlError> {
    let nodes = state
        .registry()
        .known_nodes()
        .into_iter()
        .map(|metadata| KnownNode {
            node: metadata.node().to_hex(),
            addresses: metadata.addresses().to_vec(),
            timestamp: metadata.timestamp(),
        })
        .collect();
    Ok(Envelope::new(KnownNodesResponse { nodes }))
}

impl ApiRequest for KnownNodesRequest {
    type Response = KnownNodesResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client.get(endpoint(base_url, "/api/v0/node/known_nodes"))
    }
}
