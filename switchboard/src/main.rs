#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use args::Args;
use clap::Parser;
use switchboard_config::Settings;
use switchboard_server::{Server, ServerPaths};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Settings::from_env();

    init_tracing(&settings);

    tracing::info!(
        providers_file = %args.providers_file.display(),
        rules_file = %args.rules_file.display(),
        data_dir = %args.data_dir.display(),
        "starting switchboard"
    );

    let paths = ServerPaths {
        providers_file: args.providers_file,
        rules_file: args.rules_file,
        data_dir: args.data_dir,
    };
    let server = Server::new(settings, paths).await?;

    // Set up graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    server.serve(shutdown).await?;

    tracing::info!("switchboard stopped");
    Ok(())
}

/// Log filtering from `LOG_LEVEL`, with `DEBUG_MODE` forcing debug output
fn init_tracing(settings: &Settings) {
    let level = if settings.debug_mode {
        "debug".to_owned()
    } else {
        settings.log_level.clone()
    };
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
