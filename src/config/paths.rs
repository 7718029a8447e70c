//! Well-known filesystem locations used by the daemon and the CLI.

use std::path::{Path, PathBuf};

/// Default configuration directory.
pub const DEFAULT_CONFIG_DIR: &str = "/usr/local/etc/sc";

/// Default data directory (socket, state, audit log, daemon log).
pub const DEFAULT_DATA_DIR: &str = "/usr/local/var/sc";

/// Default hosts file.
pub const DEFAULT_HOSTS_FILE: &str = "/etc/hosts";

/// Environment variable overriding the configuration directory.
pub const ENV_CONFIG_DIR: &str = "SC_CONFIG_DIR";

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "SC_DATA_DIR";

/// Environment variable overriding the hosts file.
pub const ENV_HOSTS_FILE: &str = "SC_HOSTS_FILE";

/// Resolved set of paths for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Directory holding `config.yaml`
    pub config_dir: PathBuf,
    /// Directory holding runtime data
    pub data_dir: PathBuf,
    /// The hosts file the daemon rewrites
    pub hosts_file: PathBuf,
}

impl Paths {
    /// Returns the system-wide default locations.
    pub fn system() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            hosts_file: PathBuf::from(DEFAULT_HOSTS_FILE),
        }
    }

    /// Returns the default locations, honoring the `SC_*` environment overrides.
    pub fn from_env() -> Self {
        let system = Self::system();
        Self {
            config_dir: env_path(ENV_CONFIG_DIR).unwrap_or(system.config_dir),
            data_dir: env_path(ENV_DATA_DIR).unwrap_or(system.data_dir),
            hosts_file: env_path(ENV_HOSTS_FILE).unwrap_or(system.hosts_file),
        }
    }

    /// Lays every location out under `root` (used by tests).
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("etc"),
            data_dir: root.join("var"),
            hosts_file: root.join("hosts"),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.yaml")
    }

    pub fn socket(&self) -> PathBuf {
        self.data_dir.join("sc.sock")
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("state.yaml")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.data_dir.join("logs.jsonl")
    }

    pub fn daemon_log(&self) -> PathBuf {
        self.data_dir.join("daemon.log")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
