//! Persistent record of the active unblock timers.
//!
//! The store is loaded once at daemon start, mutated under the engine lock,
//! and written back to `state.yaml` after every change. Entries that are
//! already past due at load time are dropped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fsutil;

// ============================================================================
// Errors
// ============================================================================

/// Timer store persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to write state {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode state: {0}")]
    Encode(#[from] serde_yaml::Error),
}

// ============================================================================
// UnblockEntry
// ============================================================================

/// A timed allowance for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnblockEntry {
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UnblockEntry {
    /// Returns true while `now` is before the deadline.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Time left until the deadline, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }
}

/// On-disk shape of `state.yaml`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    unblocked: BTreeMap<String, UnblockEntry>,
}

// ============================================================================
// TimerStore
// ============================================================================

/// Mapping of domain to its active unblock entry, backed by a YAML file.
#[derive(Debug)]
pub struct TimerStore {
    path: PathBuf,
    entries: HashMap<String, UnblockEntry>,
}

impl TimerStore {
    /// Creates an empty store that persists to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
        }
    }

    /// Loads the store from `path`.
    ///
    /// A missing file yields an empty store. Malformed content is logged and
    /// treated as empty. Entries with `expires_at <= now` are dropped.
    pub fn load(path: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        let mut store = Self::new(path);

        let content = match std::fs::read_to_string(&store.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return store,
            Err(e) => {
                tracing::warn!("Failed to read state {:?}: {}", store.path, e);
                return store;
            }
        };

        let state: StateFile = if content.trim().is_empty() {
            StateFile::default()
        } else {
            match serde_yaml::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!("Ignoring malformed state {:?}: {}", store.path, e);
                    return store;
                }
            }
        };

        for (domain, entry) in state.unblocked {
            if entry.is_live(now) {
                store.entries.insert(domain, entry);
            } else {
                tracing::info!("Unblock for {} expired on startup", domain);
            }
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the full mapping atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn try_save(&self) -> Result<(), StoreError> {
        let state = StateFile {
            unblocked: self
                .entries
                .iter()
                .map(|(d, e)| (d.clone(), *e))
                .collect(),
        };
        let yaml = serde_yaml::to_string(&state)?;

        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        fsutil::ensure_parent(&self.path).map_err(write_err)?;
        fsutil::atomic_write(&self.path, yaml.as_bytes(), None).map_err(write_err)
    }

    /// Writes the full mapping, logging instead of returning failures.
    pub fn save(&self) {
        if let Err(e) = self.try_save() {
            tracing::error!("{}", e);
        }
    }

    /// Inserts or replaces the entry for `domain`.
    pub fn set(&mut self, domain: impl Into<String>, start: DateTime<Utc>, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        let expires_at = start.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(
            domain.into(),
            UnblockEntry {
                started_at: start,
                expires_at,
            },
        );
    }

    pub fn get(&self, domain: &str) -> Option<&UnblockEntry> {
        self.entries.get(domain)
    }

    /// Removes the given domains, returning those that had an entry (sorted).
    pub fn clear(&mut self, domains: &[String]) -> Vec<String> {
        let mut removed: Vec<String> = domains
            .iter()
            .filter(|d| self.entries.remove(d.as_str()).is_some())
            .cloned()
            .collect();
        removed.sort();
        removed.dedup();
        removed
    }

    /// Removes every entry, returning the removed domains (sorted).
    pub fn clear_all(&mut self) -> Vec<String> {
        let mut removed: Vec<String> = self.entries.drain().map(|(d, _)| d).collect();
        removed.sort();
        removed
    }

    /// Removes and returns entries with `expires_at <= now` (sorted).
    pub fn expire_due(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.is_live(now))
            .map(|(d, _)| d.clone())
            .collect();
        for domain in &expired {
            self.entries.remove(domain);
        }
        expired.sort();
        expired
    }

    /// Domains that currently have an entry.
    pub fn unblocked_set(&self) -> HashSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_unblocked(&self, domain: &str, now: DateTime<Utc>) -> bool {
        self.entries.get(domain).is_some_and(|e| e.is_live(now))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap()
    }

    fn mins(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    // ------------------------------------------------------------------------
    // Mutation Tests
    // ------------------------------------------------------------------------

    mod mutation_tests {
        use super::*;

        #[test]
        fn test_set_computes_deadline() {
            let mut store = TimerStore::new("/unused");
            store.set("a.com", t0(), mins(15));

            let entry = store.get("a.com").unwrap();
            assert_eq!(entry.started_at, t0());
            assert_eq!(entry.expires_at, t0() + chrono::Duration::minutes(15));
        }

        #[test]
        fn test_set_overwrites() {
            let mut store = TimerStore::new("/unused");
            store.set("a.com", t0(), mins(15));
            store.set("a.com", t0(), mins(30));

            assert_eq!(store.len(), 1);
            assert_eq!(
                store.get("a.com").unwrap().remaining(t0()),
                Duration::from_secs(1800)
            );
        }

        #[test]
        fn test_clear_returns_removed_sorted() {
            let mut store = TimerStore::new("/unused");
            store.set("b.com", t0(), mins(1));
            store.set("a.com", t0(), mins(1));

            let removed = store.clear(&names(&["b.com", "x.com", "a.com"]));

            assert_eq!(removed, names(&["a.com", "b.com"]));
            assert!(store.is_empty());
        }

        #[test]
        fn test_clear_all() {
            let mut store = TimerStore::new("/unused");
            store.set("b.com", t0(), mins(1));
            store.set("a.com", t0(), mins(1));

            assert_eq!(store.clear_all(), names(&["a.com", "b.com"]));
            assert!(store.clear_all().is_empty());
        }
    }

    // ------------------------------------------------------------------------
    // Expiry Tests
    // ------------------------------------------------------------------------

    mod expiry_tests {
        use super::*;

        #[test]
        fn test_expire_due_boundary_is_inclusive() {
            let mut store = TimerStore::new("/unused");
            store.set("a.com", t0(), mins(15));
            let deadline = t0() + chrono::Duration::minutes(15);

            assert!(store
                .expire_due(deadline - chrono::Duration::seconds(1))
                .is_empty());
            assert!(store.is_unblocked("a.com", deadline - chrono::Duration::seconds(1)));
            assert_eq!(store.expire_due(deadline), names(&["a.com"]));
            assert!(!store.is_unblocked("a.com", deadline));
        }

        #[test]
        fn test_expire_due_only_removes_past_entries() {
            let mut store = TimerStore::new("/unused");
            store.set("short.com", t0(), mins(5));
            store.set("long.com", t0(), mins(60));

            let expired = store.expire_due(t0() + chrono::Duration::minutes(10));

            assert_eq!(expired, names(&["short.com"]));
            assert_eq!(store.unblocked_set(), HashSet::from(["long.com".to_string()]));
        }

        #[test]
        fn test_remaining_saturates_at_zero() {
            let entry = UnblockEntry {
                started_at: t0(),
                expires_at: t0() + chrono::Duration::minutes(1),
            };
            assert_eq!(
                entry.remaining(t0() + chrono::Duration::minutes(5)),
                Duration::ZERO
            );
        }
    }

    // ------------------------------------------------------------------------
    // Persistence Tests
    // ------------------------------------------------------------------------

    mod persistence_tests {
        use super::*;

        #[test]
        fn test_round_trip() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("var").join("state.yaml");

            let mut store = TimerStore::new(&path);
            store.set("a.com", t0(), mins(15));
            store.set("b.com", t0(), mins(30));
            store.try_save().unwrap();

            let loaded = TimerStore::load(&path, t0());
            assert_eq!(loaded.len(), 2);
            assert_eq!(loaded.get("a.com"), store.get("a.com"));
            assert_eq!(loaded.get("b.com"), store.get("b.com"));
        }

        #[test]
        fn test_load_drops_expired_entries() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.yaml");

            let mut store = TimerStore::new(&path);
            store.set("a.com", t0(), mins(15));
            store.set("b.com", t0(), mins(30));
            store.try_save().unwrap();

            let loaded = TimerStore::load(&path, t0() + chrono::Duration::minutes(20));
            assert_eq!(loaded.unblocked_set(), HashSet::from(["b.com".to_string()]));
        }

        #[test]
        fn test_load_missing_file_is_empty() {
            let dir = tempfile::tempdir().unwrap();
            let store = TimerStore::load(dir.path().join("state.yaml"), t0());
            assert!(store.is_empty());
        }

        #[test]
        fn test_load_malformed_file_is_empty() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.yaml");
            std::fs::write(&path, "unblocked: [this, is, not, a, map]").unwrap();

            let store = TimerStore::load(&path, t0());
            assert!(store.is_empty());
        }

        #[test]
        fn test_saved_yaml_shape() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.yaml");

            let mut store = TimerStore::new(&path);
            store.set("a.com", t0(), mins(15));
            store.try_save().unwrap();

            let yaml = std::fs::read_to_string(&path).unwrap();
            assert!(yaml.contains("unblocked:"));
            assert!(yaml.contains("a.com:"));
            assert!(yaml.contains("started_at:"));
            assert!(yaml.contains("2026-10-17T09:15:00Z"));
        }

        #[test]
        fn test_try_save_fails_on_unwritable_path() {
            let dir = tempfile::tempdir().unwrap();
            let blocker = dir.path().join("file");
            std::fs::write(&blocker, "x").unwrap();

            let store = TimerStore::new(blocker.join("state.yaml"));
            assert!(matches!(store.try_save(), Err(StoreError::Write { .. })));
        }
    }
}
