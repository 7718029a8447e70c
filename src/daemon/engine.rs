//! Block engine: the daemon's state and every operation on it.
//!
//! The engine owns the configuration, the timer store and handles to the
//! enforcement, DNS and audit collaborators. It is shared between the
//! reconciler and the request handler as `Arc<tokio::sync::Mutex<_>>`, so
//! each operation below runs with exclusive access and leaves the hosts
//! block consistent with the store when it returns.
//!
//! Every operation has an `*_at` form that takes the current time, which the
//! tests use to move the clock without sleeping.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinError;

use crate::audit::{AuditEntry, AuditSink, ReblockReason};
use crate::config::{normalize_domain, Config};
use crate::dns::CacheFlusher;
use crate::hosts::EnforcementSink;
use crate::types::{
    format_remaining, DomainState, ListData, MutateData, ReblockData, StatusData, StatusEntry,
    UnblockData,
};

use super::reconciler::ReconcileReport;
use super::store::TimerStore;

// ============================================================================
// RequestError
// ============================================================================

/// Validation failures. A request that fails validation changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("{0} required")]
    MissingArgument(&'static str),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("duration must be greater than zero")]
    NonPositiveDuration,

    #[error("domain \"{0}\" not in block list")]
    UnknownDomain(String),

    #[error("block list is empty")]
    EmptyBlockList,
}

// ============================================================================
// BlockEngine
// ============================================================================

pub struct BlockEngine {
    config: Config,
    config_path: PathBuf,
    store: TimerStore,
    enforcer: Arc<dyn EnforcementSink>,
    flusher: Arc<dyn CacheFlusher>,
    audit: Arc<dyn AuditSink>,
    started_at: DateTime<Utc>,
}

impl BlockEngine {
    pub fn new(
        config: Config,
        config_path: impl Into<PathBuf>,
        store: TimerStore,
        enforcer: Arc<dyn EnforcementSink>,
        flusher: Arc<dyn CacheFlusher>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            config_path: config_path.into(),
            store,
            enforcer,
            flusher,
            audit,
            started_at: Utc::now(),
        }
    }

    /// Overrides the start time used for uptime.
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn store(&self) -> &TimerStore {
        &self.store
    }

    pub fn check_interval(&self) -> Duration {
        self.config.settings.check_interval
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    pub fn reconcile(&mut self) -> ReconcileReport {
        self.reconcile_at(Utc::now())
    }

    /// Expires due timers, rewrites the hosts block and flushes DNS when the
    /// block changed. The store is persisted if any timer expired, even when
    /// the hosts rewrite failed.
    pub fn reconcile_at(&mut self, now: DateTime<Utc>) -> ReconcileReport {
        let expired = self.store.expire_due(now);
        for domain in &expired {
            tracing::info!("Timer expired for {}, reblocking", domain);
            self.record(AuditEntry::reblock(
                domain.as_str(),
                ReblockReason::TimerExpired,
                now,
            ));
        }

        let hosts_changed = self.enforce();
        let flushed = hosts_changed && self.flush();

        if !expired.is_empty() {
            self.store.save();
        }

        ReconcileReport {
            expired,
            hosts_changed,
            flushed,
        }
    }

    fn enforce(&self) -> bool {
        let unblocked = self.store.unblocked_set();
        match self.enforcer.apply(
            &self.config.domains,
            &unblocked,
            self.config.settings.block_subdomains,
        ) {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!("Failed to apply hosts block: {}", e);
                false
            }
        }
    }

    fn flush(&self) -> bool {
        if !self.config.settings.flush_dns {
            return false;
        }
        match self.flusher.flush() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.audit.record(&entry) {
            tracing::warn!("Failed to write audit entry: {}", e);
        }
    }

    fn save_config(&self) {
        if let Err(e) = self.config.save(&self.config_path) {
            tracing::error!("{}", e);
        }
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    pub fn unblock(
        &mut self,
        domains: &[String],
        duration: Duration,
    ) -> Result<UnblockData, RequestError> {
        self.unblock_at(domains, duration, Utc::now())
    }

    /// Unblocks `domains` (every configured domain when empty) for
    /// `duration`, capped at `max_unblock_duration`.
    ///
    /// # Errors
    ///
    /// Rejects the whole request, without any change, if the duration is
    /// zero or a domain is not in the block list.
    pub fn unblock_at(
        &mut self,
        domains: &[String],
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<UnblockData, RequestError> {
        if duration.is_zero() {
            return Err(RequestError::NonPositiveDuration);
        }

        let targets = if domains.is_empty() {
            self.config.domains.clone()
        } else {
            let mut targets: Vec<String> = Vec::with_capacity(domains.len());
            for domain in domains.iter().map(|d| normalize_domain(d)) {
                if !self.config.has_domain(&domain) {
                    return Err(RequestError::UnknownDomain(domain));
                }
                if !targets.contains(&domain) {
                    targets.push(domain);
                }
            }
            targets
        };
        if targets.is_empty() {
            return Err(RequestError::EmptyBlockList);
        }

        let effective = self.config.settings.cap_duration(duration);
        if effective < duration {
            tracing::info!(
                "Capping unblock of {} to {}",
                humantime::format_duration(duration),
                humantime::format_duration(effective)
            );
        }

        for domain in &targets {
            self.store.set(domain.as_str(), now, effective);
            self.record(AuditEntry::unblock(domain.as_str(), effective, now));
            tracing::info!(
                "Unblocked {} for {}",
                domain,
                humantime::format_duration(effective)
            );
        }

        self.reconcile_at(now);
        self.store.save();

        Ok(UnblockData {
            domains: targets,
            duration: humantime::format_duration(effective).to_string(),
        })
    }

    pub fn reblock(&mut self, domains: &[String]) -> ReblockData {
        self.reblock_at(domains, Utc::now())
    }

    /// Ends the unblock of `domains` (every unblocked domain when empty).
    /// Returns exactly the domains that were unblocked.
    pub fn reblock_at(&mut self, domains: &[String], now: DateTime<Utc>) -> ReblockData {
        let removed = if domains.is_empty() {
            self.store.clear_all()
        } else {
            let normalized: Vec<String> = domains.iter().map(|d| normalize_domain(d)).collect();
            self.store.clear(&normalized)
        };

        for domain in &removed {
            tracing::info!("Manually reblocked {}", domain);
            self.record(AuditEntry::reblock(
                domain.as_str(),
                ReblockReason::Manual,
                now,
            ));
        }

        self.reconcile_at(now);
        if !removed.is_empty() {
            self.store.save();
        }

        ReblockData { domains: removed }
    }

    pub fn add_domains(&mut self, domains: &[String]) -> MutateData {
        self.add_domains_at(domains, Utc::now())
    }

    /// Appends new domains to the block list, skipping empties and
    /// duplicates.
    pub fn add_domains_at(&mut self, domains: &[String], now: DateTime<Utc>) -> MutateData {
        let added: Vec<String> = domains
            .iter()
            .filter_map(|d| self.config.add_domain(d))
            .collect();

        if !added.is_empty() {
            tracing::info!("Added {}", added.join(", "));
            self.save_config();
        }
        self.reconcile_at(now);

        MutateData {
            added,
            removed: Vec::new(),
            domains: self.config.domains.clone(),
        }
    }

    pub fn remove_domains(&mut self, domains: &[String]) -> MutateData {
        self.remove_domains_at(domains, Utc::now())
    }

    /// Removes domains from the block list, dropping any live unblock for
    /// them.
    pub fn remove_domains_at(&mut self, domains: &[String], now: DateTime<Utc>) -> MutateData {
        let removed: Vec<String> = domains
            .iter()
            .filter_map(|d| self.config.remove_domain(d))
            .collect();

        if !removed.is_empty() {
            tracing::info!("Removed {}", removed.join(", "));
            self.save_config();
        }
        let cleared = self.store.clear(&removed);

        self.reconcile_at(now);
        if !cleared.is_empty() {
            self.store.save();
        }

        MutateData {
            added: Vec::new(),
            removed,
            domains: self.config.domains.clone(),
        }
    }

    pub fn status(&self) -> StatusData {
        self.status_at(Utc::now())
    }

    /// Reports every configured domain with its state and remaining time.
    pub fn status_at(&self, now: DateTime<Utc>) -> StatusData {
        let domains = self
            .config
            .domains
            .iter()
            .map(|domain| match self.store.get(domain) {
                Some(entry) if entry.is_live(now) => StatusEntry {
                    domain: domain.clone(),
                    state: DomainState::Unblocked,
                    remaining: Some(format_remaining(entry.remaining(now))),
                },
                _ => StatusEntry {
                    domain: domain.clone(),
                    state: DomainState::Blocked,
                    remaining: None,
                },
            })
            .collect();

        let uptime = (now - self.started_at).to_std().unwrap_or_default();
        StatusData {
            uptime: format_remaining(uptime),
            domains,
        }
    }

    pub fn list_domains(&self) -> ListData {
        ListData {
            domains: self.config.domains.clone(),
        }
    }
}

/// Runs `op` on the blocking thread pool with the engine lock held until it
/// returns.
///
/// Engine operations write files and may shell out to flush the DNS cache,
/// none of which may stall the runtime's accept loop or timers. The lock is
/// owned by the blocking task, so it stays held even if the caller is
/// cancelled mid-operation.
///
/// # Errors
///
/// Returns the [`JoinError`] if `op` panicked.
pub async fn run_locked<R, F>(engine: &Arc<Mutex<BlockEngine>>, op: F) -> Result<R, JoinError>
where
    F: FnOnce(&mut BlockEngine) -> R + Send + 'static,
    R: Send + 'static,
{
    let mut guard = Arc::clone(engine).lock_owned().await;
    tokio::task::spawn_blocking(move || op(&mut guard)).await
}

// ============================================================================
// Tests
// ============================================================================
