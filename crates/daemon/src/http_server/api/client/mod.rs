use reqwest::{Client, RequestBuilder};
use url::Url;

#[allow(clippy::module_inception)]
mod client;
mod error;

pub use client::ApiClient;
pub use error::ApiError;

/// A control surface call: how to send it and what comes back inside the
/// result envelope.
pub trait ApiRequest {
    type Response: serde::de::DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder;
}
