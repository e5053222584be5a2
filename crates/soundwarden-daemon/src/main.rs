//! SoundWarden Daemon - audio device and routing policy service.
//!
//! Mirrors the audio server's cards, sinks, sources and streams, applies
//! persisted per-port policy and priority-based port selection, and serves
//! queries and commands over a Unix socket.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod server;
mod signals;

use soundwarden_core::{AudioEngine, Dispatcher};
use soundwarden_db::{Database, SharedDatabase};
use soundwarden_ipc::{Event, IpcServer, Method, Response, socket_path};
use soundwarden_pipewire::PipeWireBackend;

use crate::signals::SignalAction;

/// How long to wait for the dispatcher to drain on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const LOG_TARGETS: &[&str] =
    &["soundwarden_daemon", "soundwarden_core", "soundwarden_pipewire", "soundwarden_db", "soundwarden_ipc"];

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;

    let mut filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        filter = filter.add_directive(format!("{target}={}", config.daemon.log_level).parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting SoundWarden daemon");

    // Open database
    let db = match &config.database.path {
        Some(path) => Database::open_at(path),
        None => Database::open(),
    }
    .context("Failed to open database")?;
    let store = Arc::new(SharedDatabase::new(db));
    info!("Database initialized");

    // Audio server binding; the engine initializes on the first Connected
    let (backend, streams) =
        PipeWireBackend::spawn(&config.backend()).context("Failed to start PipeWire backend")?;
    let engine = Arc::new(AudioEngine::new(backend.clone(), store, config.engine()));
    let dispatcher = Dispatcher::spawn(Arc::clone(&engine), streams.events, streams.states);

    // Start IPC server
    let socket = socket_path();
    let (ipc_server, mut request_rx) = IpcServer::bind(&socket).await.context("Failed to start IPC server")?;
    let event_tx = ipc_server.event_sender();
    let ipc_handle = tokio::spawn(async move {
        ipc_server.run().await;
    });

    // Forward property changes to IPC clients
    let mut changes = engine.subscribe();
    let forwarder = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => match Event::from_change(&change) {
                    Ok(event) => {
                        let _ = event_tx.send(event);
                    }
                    Err(e) => error!(error = %e, "Failed to encode property change"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Property change forwarding lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut signal_rx = signals::setup_signal_handlers()?;

    info!("Daemon running. Press Ctrl+C to exit.");

    loop {
        tokio::select! {
            Some(pending) = request_rx.recv() => {
                let id = pending.request.id;
                debug!(client_id = pending.client_id, request_id = id, "Handling IPC request");

                if matches!(pending.request.method, Method::Shutdown) {
                    info!("Shutdown requested via IPC");
                    let _ = pending.reply.send(Response::ok(id, serde_json::json!({ "success": true }))).await;
                    break;
                }

                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let method = pending.request.method;
                    let result = tokio::task::spawn_blocking(move || server::handle_request(&engine, &method)).await;
                    let response = match result {
                        Ok(result) => Response { id, result },
                        Err(e) => {
                            error!(request_id = id, error = %e, "Request handler panicked");
                            Response::err(id, soundwarden_ipc::ErrorInfo::new(500, "Internal error"))
                        }
                    };
                    let _ = pending.reply.send(response).await;
                });
            }

            Some(action) = signal_rx.recv() => match action {
                SignalAction::Shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                SignalAction::Reconcile => {
                    info!("Reconciliation requested by signal");
                    let engine = Arc::clone(&engine);
                    if let Err(e) = tokio::task::spawn_blocking(move || engine.reinitialize()).await {
                        error!(error = %e, "Reconciliation panicked");
                    }
                }
            },
        }
    }

    // Cleanup
    info!("Shutting down...");
    engine.shutdown();
    backend.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE, dispatcher.join()).await.is_err() {
        warn!("Event dispatcher did not stop in time");
    }
    forwarder.abort();
    ipc_handle.abort();
    let _ = ipc_handle.await;

    info!("SoundWarden daemon stopped");
    Ok(())
}
