#![allow(clippy::must_use_candidate)]

//! Server assembly: routes, middleware layers, and the serve loop.

mod admin;
mod auth;
mod cors;
mod health;
mod stats;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use switchboard_config::{ConfigStore, Settings};
use switchboard_llm::LlmState;
use switchboard_store::{RotationStore, UsageSink, UsageStore};
use tower_http::trace::TraceLayer;

/// Filesystem locations the server works with
#[derive(Debug, Clone)]
pub struct ServerPaths {
    /// Providers document (JSON with comments)
    pub providers_file: PathBuf,
    /// Rules document (JSON with comments)
    pub rules_file: PathBuf,
    /// Directory holding the SQLite databases
    pub data_dir: PathBuf,
}

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from settings and file locations
    ///
    /// # Errors
    ///
    /// Returns an error when configuration loading/validation fails, the
    /// data directory or databases cannot be created, or the upstream HTTP
    /// client cannot be built.
    pub async fn new(settings: Settings, paths: ServerPaths) -> anyhow::Result<Self> {
        let listen_address = SocketAddr::new(
            settings
                .gateway_host
                .parse::<IpAddr>()
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            settings.gateway_port,
        );

        let config = Arc::new(ConfigStore::load(
            paths.providers_file,
            paths.rules_file,
            settings.fallback_provider.clone(),
        )?);

        std::fs::create_dir_all(&paths.data_dir)?;
        let rotation = RotationStore::open(paths.data_dir.join("model_rotation.db"))?;
        let usage_store = UsageStore::open(paths.data_dir.join("tokens_usage.db"))?;
        let usage_sink = UsageSink::spawn(usage_store.clone());

        let llm_state = LlmState::new(
            Arc::clone(&config),
            rotation,
            usage_sink,
            settings.fallback_provider.clone(),
        )?;

        let mut app = Router::new()
            .route("/health", axum::routing::get(health::health_handler))
            .merge(switchboard_llm::llm_router(llm_state))
            .merge(admin::admin_router(Arc::clone(&config)))
            .merge(stats::stats_router(usage_store));

        // Apply middleware layers (innermost first)

        // Tracing
        app = app.layer(TraceLayer::new_for_http());

        // CORS
        app = app.layer(cors::cors_layer(settings.cors_allow_origins.as_deref()));

        // Gateway key authentication
        if let Some(gateway_key) = settings.gateway_api_key {
            app = app.layer(axum::middleware::from_fn(move |req, next| {
                let gateway_key = gateway_key.clone();
                async move { auth::auth_middleware(gateway_key, req, next).await }
            }));
        } else {
            tracing::warn!("GATEWAY_API_KEY is not set, requests are not authenticated");
        }

        Ok(Self {
            router: app,
            listen_address,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "gateway listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
