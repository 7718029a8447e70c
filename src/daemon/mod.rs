//! Daemon module for sc.
//!
//! This module contains the core daemon functionality:
//! - `engine`: Block list, unblock timers and every operation on them
//! - `store`: Persistent unblock timers
//! - `reconciler`: Fixed-interval expiry and hosts enforcement
//! - `ipc`: Unix socket server and request dispatch

pub mod engine;
pub mod ipc;
pub mod reconciler;
pub mod store;

pub use engine::{run_locked, BlockEngine, RequestError};
pub use ipc::{IpcError, IpcServer, RequestHandler};
pub use reconciler::{ReconcileReport, Reconciler};
pub use store::{StoreError, TimerStore, UnblockEntry};

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{watch, Mutex};

use crate::audit::JsonlAuditLog;
use crate::config::{Config, Paths};
use crate::dns::SystemDnsFlusher;
use crate::hosts::HostsFile;

/// Runs the daemon until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the control
/// socket cannot be bound.
pub async fn run(paths: &Paths) -> Result<()> {
    run_until(paths, shutdown_signal()).await
}

/// Runs the daemon until `shutdown` completes.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the control
/// socket cannot be bound.
pub async fn run_until<F>(paths: &Paths, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let config_path = paths.config_file();
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config {:?}", config_path))?;
    let store = TimerStore::load(paths.state_file(), Utc::now());

    tracing::info!(
        "Daemon starting: {} domains, check interval {}, {} active unblocks",
        config.domains.len(),
        humantime::format_duration(config.settings.check_interval),
        store.len()
    );

    let engine = BlockEngine::new(
        config,
        config_path,
        store,
        Arc::new(HostsFile::new(&paths.hosts_file)),
        Arc::new(SystemDnsFlusher::new()),
        Arc::new(JsonlAuditLog::new(paths.audit_log())),
    );
    let check_interval = engine.check_interval();
    let engine = Arc::new(Mutex::new(engine));

    let report = run_locked(&engine, |engine| engine.reconcile())
        .await
        .context("Startup reconcile failed")?;
    tracing::debug!("Startup reconcile: {:?}", report);

    let server = IpcServer::bind(&paths.socket())
        .await
        .context("Failed to start IPC server")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handler = Arc::new(RequestHandler::new(Arc::clone(&engine)));
    let server_task = tokio::spawn(server.serve(handler, shutdown_rx.clone()));
    let reconciler_task =
        tokio::spawn(Reconciler::new(Arc::clone(&engine), check_interval, shutdown_rx).run());

    shutdown.await;
    tracing::info!("Daemon stopping");

    let _ = shutdown_tx.send(true);
    if let Err(e) = reconciler_task.await {
        tracing::error!("Reconciler task failed: {}", e);
    }
    if let Err(e) = server_task.await {
        tracing::error!("IPC server task failed: {}", e);
    }

    tracing::info!("Daemon stopped");
    Ok(())
}

/// Completes on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
