use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::characters::{CanDecrypt, CanSign};

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{endpoint, ControlError, Envelope};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct PublicKeysRequest;

/// What Alice needs to grant to this node's Bob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeysResponse {
    pub bob_encrypting_key: String,
    pub bob_signing_key: String,
}

pub async fn handler(State(state): State<ServiceState>) -> Result<impl IntoResponse, ControlError> {
    let bob = state.bob();
    Ok(Envelope::new(PublicKeysResponse {
        bob_encrypting_key: bob.encrypting_key().to_hex(),
        bob_signing_key: bob.stamp().to_hex(),
    }))
}

impl ApiRequest for PublicKeysRequest {
    type Response = PublicKeysResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client.get(endpoint(base_url, "/api/v0/bob/public_keys"))
    }
}
