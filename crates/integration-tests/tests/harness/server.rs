//! Test server wrapper that starts the gateway on a random port

use std::net::SocketAddr;
use std::time::Duration;

use switchboard_server::Server;
use tokio_util::sync::CancellationToken;

use super::config::GatewayConfig;

/// A running gateway instance for one test
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    _config: GatewayConfig,
}

impl TestServer {
    /// Start a gateway with the given configuration
    ///
    /// Binds to port 0 for automatic port assignment
    pub async fn start(config: GatewayConfig) -> anyhow::Result<Self> {
        let server = Server::new(config.settings.clone(), config.paths.clone()).await?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        // Bind the listener here so we know the actual port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        let client = reqwest::Client::new();

        Ok(Self {
            addr,
            shutdown,
            client,
            _config: config,
        })
    }

    /// Full URL for a gateway path
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Poll the stats endpoint until `n` usage records are persisted
    ///
    /// The usage writer runs behind a channel, so records land shortly after
    /// the response completes.
    pub async fn wait_for_usage_records(&self, n: u64) -> Vec<serde_json::Value> {
        for _ in 0..100 {
            let response = self
                .client
                .get(self.url("/v1/stats/usage-records"))
                .send()
                .await
                .expect("stats request");
            let body: serde_json::Value = response.json().await.expect("stats body");
            if body["total_records"].as_u64() == Some(n) {
                return body["records"].as_array().cloned().unwrap_or_default();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {n} usage records to be persisted");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
