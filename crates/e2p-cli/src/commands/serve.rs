//! Serve command implementation.

use crate::server::{start_server, ServerState};
use anyhow::Result;
use e2p_core::engine::Receiver;
use e2p_core::Config;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Run the receiver with its HTTP front end.
pub async fn run(
    mut config: Config,
    ingest_port: Option<u16>,
    health_port: Option<u16>,
) -> Result<()> {
    // Apply CLI overrides
    if let Some(port) = ingest_port {
        config.monitoring.ingest_port = port;
    }
    if let Some(port) = health_port {
        config.monitoring.health_port = port;
    }

    info!(
        variant = ?config.record.variant,
        backend = ?config.buffer.backend,
        threshold = config.buffer.flush_threshold,
        sink = %config.sink.location,
        "Starting receiver"
    );

    let variant = config.record.variant;
    let ingest_port = config.monitoring.ingest_port;
    let health_port = config.monitoring.health_port;

    let receiver = Receiver::from_config(&config)?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let server_state = Arc::new(ServerState {
        receiver: receiver.clone(),
        variant,
    });

    // Start HTTP servers
    let server_shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(start_server(
        server_state,
        ingest_port,
        health_port,
        server_shutdown_rx,
    ));

    // Spawn a task to handle shutdown signals (SIGINT and SIGTERM)
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        let _ = shutdown_signal.send(());
    });

    // Run the flush sweep; a flush in progress at shutdown completes before
    // the receiver closes
    receiver.run(shutdown_tx.subscribe()).await?;

    info!("Receiver stopped");
    Ok(())
}
