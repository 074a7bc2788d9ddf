//! Shared helpers for control surface tests
#![allow(dead_code)]

use axum::body::Body;
use axum::Router;
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use common::discovery::NodeDiscovery;
use common::prelude::{DecryptingKey, DelegatingSecret, SecretKey};
use common::testkit::TestNetwork;
use trove_daemon::state::NodeKeys;
use trove_daemon::{ServiceConfig, ServiceState};

/// A control surface in front of an in-process network of Ursulas.
pub struct Control {
    pub net: TestNetwork,
    pub state: ServiceState,
}

impl Control {
    pub fn with_ursulas(count: usize) -> Self {
        let net = TestNetwork::with_ursulas(count);
        let config = ServiceConfig {
            keys: Some(NodeKeys {
                signer: SecretKey::generate(),
                decrypting: DecryptingKey::generate(),
                delegating: DelegatingSecret::generate(),
            }),
            teachers: net.registry().known_nodes(),
            negotiation: TestNetwork::negotiation_config(),
            retrieval: TestNetwork::retrieval_config(),
            ..ServiceConfig::default()
        };
        let state = ServiceState::with_transport(&config, net.transport())
            .expect("control state over the test network");
        Self { net, state }
    }

    pub fn router(&self) -> Router {
        trove_daemon::http_server::router(self.state.clone())
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        self.raw(request).await
    }

    pub async fn raw(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

/// The `category` of an error envelope.
pub fn category(body: &Value) -> &str {
    body["error"]["category"].as_str().unwrap_or_default()
}
