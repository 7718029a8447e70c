//! Audit log of unblock and reblock events.
//!
//! Every unblock and every reblock (manual or timer driven) is appended as a
//! single JSON object per line to `logs.jsonl`. The `sc logs` command reads
//! the file back through [`query`] and summarizes it with [`stats`].

mod query;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fsutil;

pub use query::{format_duration, query, query_at, stats, DomainStats, Period, QueryOptions};

// ============================================================================
// Errors
// ============================================================================

/// Audit log errors.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to open audit log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode audit entry: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// AuditEntry
// ============================================================================

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Unblock,
    Reblock,
}

/// Why a domain was reblocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReblockReason {
    /// Requested by a client
    Manual,
    /// The unblock timer ran out
    TimerExpired,
}

impl ReblockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReblockReason::Manual => "manual",
            ReblockReason::TimerExpired => "timer_expired",
        }
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub domain: String,
    /// Requested unblock duration as a humantime literal (unblock only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Reblock reason (reblock only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReblockReason>,
}

impl AuditEntry {
    pub fn unblock(domain: impl Into<String>, duration: Duration, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            event: AuditEvent::Unblock,
            domain: domain.into(),
            duration: Some(humantime::format_duration(duration).to_string()),
            reason: None,
        }
    }

    pub fn reblock(domain: impl Into<String>, reason: ReblockReason, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            event: AuditEvent::Reblock,
            domain: domain.into(),
            duration: None,
            reason: Some(reason),
        }
    }
}

// ============================================================================
// AuditSink
// ============================================================================

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Append-only JSON-lines file.
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    path: PathBuf,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let open_err = |source| AuditError::Open {
            path: self.path.clone(),
            source,
        };
        fsutil::ensure_parent(&self.path).map_err(open_err)?;

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let mut file = options.open(&self.path).map_err(open_err)?;
        file.write_all(&line)?;
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every recorded entry.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
        Ok(())
    }
}
