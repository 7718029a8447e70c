//! Configuration for the sc daemon and CLI.
//!
//! The configuration is a YAML file holding the block list and the daemon
//! settings. It is created with defaults the first time it is loaded, and
//! rewritten by the daemon whenever domains are added or removed.

pub mod error;
pub mod paths;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fsutil;

pub use error::{ConfigError, Result};
pub use paths::Paths;

// ============================================================================
// Settings
// ============================================================================

/// Daemon and CLI settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Unblock duration used when the CLI is not given one
    #[serde(with = "humantime_serde")]
    pub default_duration: Duration,
    /// Upper bound for a single unblock; zero means unbounded
    #[serde(with = "humantime_serde", skip_serializing_if = "Duration::is_zero")]
    pub max_unblock_duration: Duration,
    /// Reconciler tick interval
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Whether to flush the DNS cache after the hosts block changes
    pub flush_dns: bool,
    /// Whether to also block the `www.` variant of every domain
    pub block_subdomains: bool,
    /// Confirmation prompts shown by `sc unblock`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unblock_warnings: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_duration: Duration::from_secs(15 * 60),
            max_unblock_duration: Duration::ZERO,
            check_interval: Duration::from_secs(5),
            flush_dns: true,
            block_subdomains: true,
            unblock_warnings: vec![
                "You're about to unblock distracting sites.".to_string(),
                "Consider whether this is truly necessary right now.".to_string(),
            ],
        }
    }
}

impl Settings {
    /// Caps `requested` at `max_unblock_duration` when a cap is configured.
    pub fn cap_duration(&self, requested: Duration) -> Duration {
        if self.max_unblock_duration.is_zero() {
            requested
        } else {
            requested.min(self.max_unblock_duration)
        }
    }
}

// ============================================================================
// Config
// ============================================================================

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Blocked domains, lowercase and trimmed, in insertion order
    pub domains: Vec<String>,
    /// Settings
    pub settings: Settings,
}

impl Config {
    /// Loads the configuration from `path`.
    ///
    /// A missing file is created with defaults. Domains are normalized and
    /// de-duplicated after parsing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated, or if
    /// the default file cannot be written.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path)?;
                tracing::info!("Created default config at {:?}", path);
                return Ok(config);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut config = Self::from_yaml(&content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration without creating it, falling back to
    /// defaults when the file is missing or unusable.
    pub fn load_or_default(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!("Using default config, cannot read {:?}: {}", path, e);
                return Self::default();
            }
        };

        let parsed = Self::from_yaml(&content).and_then(|mut config| {
            config.normalize();
            config.validate()?;
            Ok(config)
        });
        parsed.unwrap_or_else(|e| {
            tracing::warn!("Using default config: {}", e);
            Self::default()
        })
    }

    /// Parses a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serializes the configuration to YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ConfigError::Serialize)
    }

    /// Atomically writes the configuration to `path`, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        fsutil::ensure_parent(path).map_err(write_err)?;
        fsutil::atomic_write(path, yaml.as_bytes(), None).map_err(write_err)
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `check_interval` or `default_duration` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.settings.check_interval.is_zero() {
            return Err(ConfigError::Validation(
                "check_interval must be greater than zero".to_string(),
            ));
        }
        if self.settings.default_duration.is_zero() {
            return Err(ConfigError::Validation(
                "default_duration must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true if `domain` (after normalization) is in the block list.
    pub fn has_domain(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        self.domains.iter().any(|d| *d == domain)
    }

    /// Appends `domain` to the block list.
    ///
    /// Returns the normalized domain if it was added, or `None` if it was
    /// empty or already present.
    pub fn add_domain(&mut self, domain: &str) -> Option<String> {
        let domain = normalize_domain(domain);
        if domain.is_empty() || self.has_domain(&domain) {
            return None;
        }
        self.domains.push(domain.clone());
        Some(domain)
    }

    /// Removes `domain` from the block list.
    ///
    /// Returns the normalized domain if it was present.
    pub fn remove_domain(&mut self, domain: &str) -> Option<String> {
        let domain = normalize_domain(domain);
        let index = self.domains.iter().position(|d| *d == domain)?;
        Some(self.domains.remove(index))
    }

    /// Normalizes every domain and drops empties and duplicates, keeping the
    /// first occurrence.
    fn normalize(&mut self) {
        let raw = std::mem::take(&mut self.domains);
        for domain in raw {
            self.add_domain(&domain);
        }
    }
}

/// Trims and lowercases a hostname.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_lowercase()
}

/// Splits a comma-joined domain list, normalizing each entry and dropping
/// empties.
pub fn split_domains(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(normalize_domain)
        .filter(|d| !d.is_empty())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
