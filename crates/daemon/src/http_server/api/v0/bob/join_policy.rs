use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::policy::EncryptedTreasureMap;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::v0::control::{
    endpoint, public_key, ControlError, Envelope, Payload,
};
use crate::ServiceState;

pub const POLICY_JOINED: &str = "Policy joined!";

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct JoinPolicyRequest {
    /// Policy label
    #[arg(long)]
    pub label: String,
    /// Alice's signing key (hex)
    #[arg(long)]
    pub alice_signing_key: String,
    /// Treasure map from the grant (base64). Fetched from the network when
    /// left out.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treasure_map: Option<String>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Payload(req): Payload<JoinPolicyRequest>,
) -> Result<impl IntoResponse, ControlError> {
    let alice = public_key("alice_signing_key", &req.alice_signing_key)?;
    let treasure_map = req
        .treasure_map
        .as_deref()
        .map(EncryptedTreasureMap::from_base64)
        .transpose()
        .map_err(|e| ControlError::BadRequest(format!("treasure_map: {e}")))?;

    state
        .bob()
        .join_policy(&req.label, &alice, treasure_map)
        .await?;

    Ok(Envelope::new(POLICY_JOINED.to_string()))
}

impl ApiRequest for JoinPolicyRequest {
    type Response = String;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(base_url, "/api/v0/bob/join_policy"))
            .json(&self)
    }
}
