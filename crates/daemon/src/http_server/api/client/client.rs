use reqwest::{header::HeaderMap, header::HeaderValue, Client};
use serde::Deserialize;
use url::Url;

use super::error::ApiError;
use super::ApiRequest;
use crate::http_server::api::v0::Envelope;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    category: String,
    message: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    pub async fn call<T: ApiRequest>(&mut self, request: T) -> Result<T::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client);
        let response = request_builder.send().await?;

        let status = response.status();
        if status.is_success() {
            let envelope: Envelope<T::Response> = response.json().await?;
            return Ok(envelope.result);
        }

        let text = response.text().await?;
        match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(ErrorEnvelope { error }) => Err(ApiError::Control {
                category: error.category,
                message: error.message,
            }),
            Err(_) => Err(ApiError::HttpStatus(status, text)),
        }
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Get the underlying HTTP client for custom requests
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}
