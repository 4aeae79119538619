//! RTMP relay binary
//!
//! Runs the RTMP relay and the stream key API side by side.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

use rtmp_relay::api::{build_router, AppState};
use rtmp_relay::client::RtmpConnector;
use rtmp_relay::config::AppConfig;
use rtmp_relay::keystore::KeyStore;
use rtmp_relay::logging;
use rtmp_relay::relay::RelayHandlerFactory;
use rtmp_relay::server::RtmpServer;
use rtmp_relay::stats::ConnectionCounters;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("failed to load config")?;
    logging::init(&config.log).context("failed to init logging")?;
    let config = Arc::new(config);

    tracing::info!(
        rtmp = %config.server.bind_addr,
        api = %config.api.bind_addr,
        upstream = %config.upstream.host,
        "Starting RTMP relay"
    );

    let keystore = Arc::new(KeyStore::new());
    let counters = Arc::new(ConnectionCounters::new());

    let sweep_handle = keystore.spawn_cleanup_task(config.keystore.sweep_interval_duration());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // RTMP relay
    let factory = RelayHandlerFactory::new(
        RtmpConnector::new(config.upstream.clone()),
        config.upstream.clone(),
    );
    let server = RtmpServer::new(config.server.clone(), factory, Arc::clone(&counters));
    let relay_listener = TcpListener::bind(config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    let relay_handle = tokio::spawn(async move {
        let shutdown = wait_for(shutdown_rx);
        if let Err(e) = server.serve_until(relay_listener, shutdown).await {
            tracing::error!(error = %e, "RTMP relay error");
        }
    });

    // Stream key API
    let state = AppState::new(
        Arc::clone(&keystore),
        Arc::clone(&counters),
        Arc::new(config.keystore.clone()),
    );
    let router = build_router(state);
    let api_listener = TcpListener::bind(config.api.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.api.bind_addr))?;
    tracing::info!(addr = %config.api.bind_addr, "HTTP server listening");

    axum::serve(api_listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, initiating graceful shutdown...");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = relay_handle.await;
    sweep_handle.abort();

    tracing::info!("RTMP relay shutdown complete");
    Ok(())
}

/// Resolve once the shutdown flag flips
async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
