//! Periodic reconciliation loop.
//!
//! Every `check_interval` the reconciler takes the engine lock, expires due
//! timers and brings the hosts block back in line with the engine state.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::engine::{run_locked, BlockEngine};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Domains whose timers ran out during this pass (sorted)
    pub expired: Vec<String>,
    /// Whether the hosts block was rewritten
    pub hosts_changed: bool,
    /// Whether the DNS cache was flushed successfully
    pub flushed: bool,
}

/// Drives [`BlockEngine::reconcile`] on a fixed interval.
pub struct Reconciler {
    engine: Arc<Mutex<BlockEngine>>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Reconciler {
    pub fn new(
        engine: Arc<Mutex<BlockEngine>>,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            engine,
            period,
            shutdown,
        }
    }

    /// Runs until the shutdown channel flips to `true` or its sender is
    /// dropped.
    pub async fn run(mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; startup already reconciled.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match run_locked(&self.engine, |engine| engine.reconcile()).await {
                        Ok(report) if !report.expired.is_empty() || report.hosts_changed => {
                            tracing::debug!("Reconciled: {:?}", report);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!("Reconcile pass failed: {}", e),
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{MemoryAuditLog, ReblockReason};
    use crate::config::Config;
    use crate::daemon::store::TimerStore;
    use crate::dns::MockCacheFlusher;
    use crate::hosts::MemoryHosts;

    fn create_engine(dir: &std::path::Path) -> (Arc<Mutex<BlockEngine>>, Arc<MemoryHosts>, Arc<MemoryAuditLog>) {
        let hosts = Arc::new(MemoryHosts::new("127.0.0.1 localhost\n"));
        let audit = Arc::new(MemoryAuditLog::new());
        let mut config = Config::default();
        config.add_domain("a.com");
        let engine = BlockEngine::new(
            config,
            dir.join("config.yaml"),
            TimerStore::new(dir.join("state.yaml")),
            hosts.clone(),
            Arc::new(MockCacheFlusher::new()),
            audit.clone(),
        );
        (Arc::new(Mutex::new(engine)), hosts, audit)
    }

    #[tokio::test]
    async fn test_reconciler_expires_timer() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, hosts, audit) = create_engine(dir.path());

        engine
            .lock()
            .await
            .unblock(&["a.com".to_string()], Duration::from_millis(100))
            .unwrap();
        assert!(!hosts.content().contains("a.com"));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(
            Reconciler::new(engine.clone(), Duration::from_millis(50), rx).run(),
        );

        tokio::time::sleep(Duration::from_millis(400)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(hosts.content().contains("0.0.0.0 a.com"));
        let entries = audit.entries();
        assert_eq!(entries.last().unwrap().reason, Some(ReblockReason::TimerExpired));
    }

    #[tokio::test]
    async fn test_reconciler_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _hosts, _audit) = create_engine(dir.path());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Reconciler::new(engine, Duration::from_secs(60), rx).run());

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_reconciler_stops_when_sender_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _hosts, _audit) = create_engine(dir.path());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Reconciler::new(engine, Duration::from_secs(60), rx).run());

        drop(tx);
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok());
    }
}
