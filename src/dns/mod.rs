//! DNS cache flushing.
//!
//! Rewriting the hosts file does not evict names the resolver already
//! cached, so the daemon flushes the system cache whenever the managed block
//! changes. Failures are reported but never fatal.

use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use thiserror::Error;

/// DNS flush errors.
#[derive(Debug, Error)]
pub enum DnsError {
    /// None of the flush commands could be run successfully.
    #[error("DNS flush failed: {0}")]
    FlushFailed(String),
}

/// Something that can flush the resolver cache.
///
/// Implementations may block; the daemon calls them from the blocking pool.
pub trait CacheFlusher: Send + Sync {
    /// Flushes the resolver cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache could not be flushed.
    fn flush(&self) -> Result<(), DnsError>;
}

// ============================================================================
// SystemDnsFlusher
// ============================================================================

/// Flushes the operating system resolver cache by shelling out.
#[derive(Debug, Clone, Default)]
pub struct SystemDnsFlusher;

impl SystemDnsFlusher {
    pub fn new() -> Self {
        Self
    }

    /// Commands run on this platform, in order.
    fn commands() -> &'static [&'static [&'static str]] {
        if cfg!(target_os = "macos") {
            &[
                &["dscacheutil", "-flushcache"],
                &["killall", "-HUP", "mDNSResponder"],
                &["killall", "mDNSResponderHelper"],
            ]
        } else {
            &[&["resolvectl", "flush-caches"]]
        }
    }
}

impl CacheFlusher for SystemDnsFlusher {
    /// Runs every flush command. Individual failures are expected across OS
    /// versions, so only a total failure is an error.
    fn flush(&self) -> Result<(), DnsError> {
        let mut failures = Vec::new();
        let mut succeeded = 0usize;

        for argv in Self::commands() {
            let Some((program, args)) = argv.split_first() else {
                continue;
            };
            match Command::new(program).args(args).output() {
                Ok(output) if output.status.success() => succeeded += 1,
                Ok(output) => {
                    tracing::debug!("{} exited with {}", program, output.status);
                    failures.push(format!("{program}: {}", output.status));
                }
                Err(e) => {
                    tracing::debug!("Failed to run {}: {}", program, e);
                    failures.push(format!("{program}: {e}"));
                }
            }
        }

        if succeeded == 0 {
            return Err(DnsError::FlushFailed(failures.join("; ")));
        }
        Ok(())
    }
}

// ============================================================================
// MockCacheFlusher
// ============================================================================

/// Counting flusher for tests.
#[derive(Debug, Default)]
pub struct MockCacheFlusher {
    calls: AtomicUsize,
    should_fail: AtomicBool,
}

impl MockCacheFlusher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CacheFlusher for MockCacheFlusher {
    fn flush(&self) -> Result<(), DnsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(DnsError::FlushFailed("simulated failure".to_string()));
        }
        Ok(())
    }
}
