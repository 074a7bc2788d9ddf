use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use common::error::{ErrorCategory, ProtocolError};
use common::prelude::{EncryptingKey, PublicKey};
use common::version::PROTOCOL_VERSION;

/// Successful control surface reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub result: T,
    pub version: String,
}

impl<T> Envelope<T> {
    pub fn new(result: T) -> Self {
        Self {
            result,
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("this node has no endpoint of its own")]
    NoNode,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ControlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ControlError::BadRequest(_) => ErrorCategory::Input,
            ControlError::NoNode => ErrorCategory::Resource,
            ControlError::Protocol(e) => e.category(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Input => StatusCode::BAD_REQUEST,
            ErrorCategory::Negotiation | ErrorCategory::Retrieval => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCategory::Integrity => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Resource => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let category = self.category();
        match category {
            ErrorCategory::Input => tracing::warn!("rejected request: {}", self),
            _ => tracing::error!("{} error: {}", category, self),
        }
        let body = serde_json::json!({
            "error": {
                "category": category,
                "message": self.to_string(),
            },
            "version": PROTOCOL_VERSION,
        });
        (self.status(), Json(body)).into_response()
    }
}

/// JSON body whose rejections (bad syntax, missing fields, wrong types,
/// wrong content type) come back as input errors in the error envelope.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ControlError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ControlError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

pub(crate) fn encrypting_key(field: &str, hex: &str) -> Result<EncryptingKey, ControlError> {
    EncryptingKey::from_hex(hex).map_err(|e| ControlError::BadRequest(format!("{field}: {e}")))
}

pub(crate) fn public_key(field: &str, hex: &str) -> Result<PublicKey, ControlError> {
    PublicKey::from_hex(hex).map_err(|e| ControlError::BadRequest(format!("{field}: {e}")))
}

pub(crate) fn decode_base64(field: &str, encoded: &str) -> Result<Vec<u8>, ControlError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ControlError::BadRequest(format!("{field}: {e}")))
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// `base_url` with its path replaced.
pub(crate) fn endpoint(base_url: &Url, path: &str) -> Url {
    let mut url = base_url.clone();
    url.set_path(path);
    url
}

/// Accepts a single string or a list of strings.
pub(crate) fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_map_to_statuses() {
        let cases = [
            (
                ControlError::BadRequest("missing field".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ProtocolError::InvalidThreshold { m: 0, n: 1 }.into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                ProtocolError::EnactmentFailure {
                    accepted: 0,
                    required: 1,
                    failures: Vec::new(),
                }
                .into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ProtocolError::InsufficientFragments {
                    collected: 0,
                    required: 1,
                    failures: Vec::new(),
                }
                .into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ProtocolError::BadDataSource.into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ControlError::NoNode, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error}");
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_one_or_many() {
        #[derive(Deserialize)]
        struct Kits {
            #[serde(deserialize_with = "one_or_many")]
            kits: Vec<String>,
        }

        let one: Kits = serde_json::from_str(r#"{"kits": "a"}"#).unwrap();
        assert_eq!(one.kits, vec!["a"]);
        let many: Kits = serde_json::from_str(r#"{"kits": ["a", "b"]}"#).unwrap();
        assert_eq!(many.kits, vec!["a", "b"]);
        assert!(serde_json::from_str::<Kits>(r#"{"kits": 3}"#).is_err());
    }

    #[test]
    fn test_endpoint_replaces_path() {
        let base = Url::parse("http://localhost:5001/ignored").unwrap();
        assert_eq!(
            endpoint(&base, "/api/v0/alice/grant").as_str(),
            "http://localhost:5001/api/v0/alice/grant"
        );
    }
}
