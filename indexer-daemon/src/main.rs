//! indexer-daemon - Audio file watch daemon
//!
//! Watches a music directory and pushes every new `.wav`/`.mp3` file found directly
//! inside an `ebl` folder to the ingestion API. Runs until Ctrl+C or SIGTERM.
//!
//! Configuration: `API_URL`, `WATCH_DIR`, optional TOML file at `INDEXER_CONFIG`.

use anyhow::{Context, Result};
use indexer_common::config::{load_toml_config, ConfigResolver};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let resolver = ConfigResolver::new();
    init_tracing(&startup_log_level(&resolver));

    info!("Starting indexer-daemon");
    info!("Version: {}", indexer_daemon::build_info());

    let config = resolver
        .resolve()
        .context("Failed to resolve configuration")?;

    info!("API endpoint: {}", config.api_endpoint());
    info!("Watching directory: {}", config.watch_dir.display());
    info!(
        max_retries = config.upload.max_retries,
        retry_delay_ms = config.upload.retry_delay_ms,
        timeout_ms = config.upload.timeout_ms,
        stability_threshold_ms = config.stability.threshold_ms,
        poll_interval_ms = config.stability.poll_interval_ms,
        root_retry_ms = config.watch.root_retry_ms,
        "Upload and watch settings"
    );

    let pipeline = indexer_daemon::build_pipeline(&config)
        .with_context(|| format!("Failed to create API client for {}", config.api_endpoint()))?;
    let watcher = indexer_daemon::build_watcher(&config, Arc::new(pipeline));

    let shutdown = CancellationToken::new();
    let mut watch_task = tokio::spawn(watcher.run(shutdown.clone()));

    let finished_early = tokio::select! {
        _ = shutdown_signal() => None,
        joined = &mut watch_task => Some(joined),
    };
    let joined = match finished_early {
        Some(joined) => joined,
        None => {
            shutdown.cancel();
            watch_task.await
        }
    };
    let in_flight = joined.context("Watcher task failed")?;

    if !in_flight.is_empty() {
        info!(
            tasks = in_flight.len(),
            "Waiting for in-flight uploads to finish (signal again to abort)"
        );
        tokio::select! {
            _ = in_flight.wait() => {}
            _ = shutdown_signal() => {
                warn!("Second signal received, cancelling in-flight uploads");
                in_flight.cancel_all();
                in_flight.wait().await;
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Level for the default filter, read before the subscriber exists
///
/// Errors are ignored here; `ConfigResolver::resolve` reports them once logging is up.
fn startup_log_level(resolver: &ConfigResolver) -> String {
    resolver
        .config_path()
        .and_then(|path| load_toml_config(path).ok().flatten())
        .map(|config| config.logging.level)
        .unwrap_or_else(|| "info".to_string())
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("indexer_daemon={level},indexer_common={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
