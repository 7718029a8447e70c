//! Hosts file enforcement.
//!
//! The daemon owns a single delimited block inside the hosts file and
//! rewrites it to match the current block list and unblock timers. Content
//! outside the block is never touched.

pub mod block;
pub mod error;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub use block::{render, rewrite, split, strip_legacy, Split, BEGIN_MARKER, END_MARKER};
pub use error::{HostsError, Result};

use crate::fsutil;

// ============================================================================
// EnforcementSink Trait
// ============================================================================

/// Destination of the rendered block list.
pub trait EnforcementSink: Send + Sync {
    /// Rewrites the managed block so that every domain not in `unblocked`
    /// is blocked.
    ///
    /// Returns `true` if the underlying content changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be read or written.
    fn apply(
        &self,
        domains: &[String],
        unblocked: &HashSet<String>,
        block_subdomains: bool,
    ) -> Result<bool>;

    /// Removes the managed block entirely.
    ///
    /// Returns `true` if the underlying content changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be read or written.
    fn remove_block(&self) -> Result<bool>;
}

// ============================================================================
// HostsFile
// ============================================================================

/// The on-disk hosts file.
#[derive(Debug, Clone)]
pub struct HostsFile {
    path: PathBuf,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| HostsError::read(self.path.clone(), e))
    }

    /// Replaces the file through a sibling temp file carrying the original
    /// permissions.
    fn replace(&self, content: &str) -> Result<()> {
        let perms = std::fs::metadata(&self.path)
            .map_err(|e| HostsError::read(self.path.clone(), e))?
            .permissions();
        fsutil::atomic_write(&self.path, content.as_bytes(), Some(perms))
            .map_err(|e| HostsError::write(self.path.clone(), e))
    }
}

impl EnforcementSink for HostsFile {
    fn apply(
        &self,
        domains: &[String],
        unblocked: &HashSet<String>,
        block_subdomains: bool,
    ) -> Result<bool> {
        let original = self.read()?;
        let updated = block::rewrite(&original, domains, unblocked, block_subdomains);
        if updated == original {
            return Ok(false);
        }
        self.replace(&updated)?;
        tracing::debug!("Rewrote hosts block in {:?}", self.path);
        Ok(true)
    }

    fn remove_block(&self) -> Result<bool> {
        let original = self.read()?;
        let updated = block::without_block(&original);
        if updated == original {
            return Ok(false);
        }
        self.replace(&updated)?;
        Ok(true)
    }
}

// ============================================================================
// MemoryHosts
// ============================================================================

/// In-memory hosts file for tests.
///
/// Behaves like [`HostsFile`] on a string buffer and can be switched into a
/// failing mode to simulate a missing privilege.
#[derive(Debug, Default)]
pub struct MemoryHosts {
    content: Mutex<String>,
    fail: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryHosts {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Mutex::new(content.into()),
            ..Self::default()
        }
    }

    /// Returns the current buffer.
    pub fn content(&self) -> String {
        self.content
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Makes subsequent writes fail with [`HostsError::PermissionDenied`].
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn store(&self, original: &str, updated: String) -> Result<bool> {
        if updated == original {
            return Ok(false);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostsError::PermissionDenied {
                path: PathBuf::from("<memory>"),
            });
        }
        if let Ok(mut content) = self.content.lock() {
            *content = updated;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

impl EnforcementSink for MemoryHosts {
    fn apply(
        &self,
        domains: &[String],
        unblocked: &HashSet<String>,
        block_subdomains: bool,
    ) -> Result<bool> {
        let original = self.content();
        let updated = block::rewrite(&original, domains, unblocked, block_subdomains);
        self.store(&original, updated)
    }

    fn remove_block(&self) -> Result<bool> {
        let original = self.content();
        let updated = block::without_block(&original);
        self.store(&original, updated)
    }
}
