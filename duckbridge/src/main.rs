#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::path::{Path, PathBuf};

use args::{Args, DEFAULT_CONFIG_PATH};
use clap::Parser;
use duckbridge_config::Config;
use duckbridge_server::Server;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (mut config, config_path) = load_config(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_address = Some(listen);
    }

    let _telemetry_guard = duckbridge_telemetry::init(&config.telemetry)?;

    match &config_path {
        Some(path) => tracing::info!(config_path = %path.display(), "starting duckbridge"),
        None => tracing::info!("starting duckbridge with built-in defaults"),
    }
    tracing::info!(
        status_url = %config.upstream.status_url,
        chat_url = %config.upstream.chat_url,
        "upstream endpoints"
    );

    let server = Server::new(&config)?;

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    server.serve(shutdown).await?;

    tracing::info!("duckbridge stopped");
    Ok(())
}

/// Load the explicit config file, or the default one when it exists
fn load_config(explicit: Option<&Path>) -> anyhow::Result<(Config, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return Ok((Config::load(path)?, Some(path.to_path_buf())));
    }

    let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        return Ok((Config::load(&default_path)?, Some(default_path)));
    }

    Ok((Config::default(), None))
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
