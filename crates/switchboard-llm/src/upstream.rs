use std::time::Duration;

use http::HeaderMap;
use reqwest::{Client, Response};
use serde_json::Value;

/// Per-request deadline for buffered (non-streaming) upstream calls
const BUFFERED_TIMEOUT: Duration = Duration::from_secs(300);

/// Deadline for auxiliary calls such as the fallback `/models` fetch
const AUXILIARY_TIMEOUT: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Single long-lived HTTP client shared by every request
///
/// Streaming calls carry no overall deadline; buffered calls get 300 s.
/// Connection pooling is reqwest's default behavior.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    /// Build the shared client
    ///
    /// # Errors
    ///
    /// Returns an error when the TLS backend cannot be initialized.
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// POST a JSON payload and wait for the whole response
    pub(crate) async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &Value,
    ) -> reqwest::Result<Response> {
        self.client
            .post(url)
            .timeout(BUFFERED_TIMEOUT)
            .headers(headers)
            .json(body)
            .send()
            .await
    }

    /// POST a JSON payload and return the response for incremental reads
    pub(crate) async fn open_stream(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &Value,
    ) -> reqwest::Result<Response> {
        self.client.post(url).headers(headers).json(body).send().await
    }

    /// GET an auxiliary JSON endpoint (e.g. the fallback provider's `/models`)
    pub(crate) async fn get_json(&self, url: &str, headers: HeaderMap) -> reqwest::Result<Response> {
        self.client
            .get(url)
            .timeout(AUXILIARY_TIMEOUT)
            .headers(headers)
            .send()
            .await
    }
}
