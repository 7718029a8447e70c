//! launchd service management for macOS.
//!
//! Installs `sc daemon` as a system-wide launchd daemon so that blocking is
//! enforced from boot, and removes it again together with the hosts block.
//!
//! # Example
//!
//! ```no_run
//! use sc::config::Paths;
//! use sc::launchd;
//!
//! let paths = Paths::from_env();
//! launchd::install(&paths)?;
//! launchd::uninstall(&paths)?;
//! # Ok::<(), launchd::LaunchdError>(())
//! ```

pub mod error;
pub mod launchctl;
pub mod plist;

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub use error::{LaunchdError, Result};
pub use launchctl::{Launchctl, ServiceControl};
pub use plist::DaemonPlist;

use crate::config::{Config, ConfigError, Paths};
use crate::fsutil::atomic_write;
use crate::hosts::{EnforcementSink, HostsFile};

/// Location of the installed job definition.
pub const PLIST_PATH: &str = "/Library/LaunchDaemons/com.sc.daemon.plist";

/// Installs the daemon using the running executable.
///
/// Returns the path of the written plist.
///
/// # Errors
/// Returns [`LaunchdError::RequiresRoot`] when not run as root, or another
/// error if any step fails.
pub fn install(paths: &Paths) -> Result<PathBuf> {
    let binary = std::env::current_exe()
        .and_then(|exe| exe.canonicalize())
        .map_err(LaunchdError::BinaryPathResolution)?;

    let installer = Installer::system();
    installer.install(paths, &binary)?;
    Ok(installer.plist_path().to_path_buf())
}

/// Stops and removes the daemon, then strips the block from the hosts file.
///
/// # Errors
/// Returns [`LaunchdError::RequiresRoot`] when not run as root, or another
/// error if the plist cannot be removed.
pub fn uninstall(paths: &Paths) -> Result<()> {
    Installer::system().uninstall(paths)
}

/// Returns true if the job definition is present.
pub fn is_installed() -> bool {
    Path::new(PLIST_PATH).exists()
}

// ============================================================================
// Installer
// ============================================================================

/// Writes and registers the job definition.
#[derive(Debug)]
pub struct Installer<C = Launchctl> {
    plist_path: PathBuf,
    control: C,
}

impl Installer<Launchctl> {
    /// Installer for [`PLIST_PATH`] driven by `launchctl`.
    pub fn system() -> Self {
        Self::new(PLIST_PATH, Launchctl)
    }
}

impl<C: ServiceControl> Installer<C> {
    pub fn new(plist_path: impl Into<PathBuf>, control: C) -> Self {
        Self {
            plist_path: plist_path.into(),
            control,
        }
    }

    pub fn plist_path(&self) -> &Path {
        &self.plist_path
    }

    /// Installs the daemon job for `binary`.
    ///
    /// Creates the configuration and data directories and a default config
    /// file when missing, writes the plist (mode 0644), unloads any previous
    /// job and loads the new one.
    ///
    /// # Errors
    /// Returns an error if any step fails.
    pub fn install(&self, paths: &Paths, binary: &Path) -> Result<()> {
        for dir in [&paths.config_dir, &paths.data_dir] {
            fs::create_dir_all(dir).map_err(|source| {
                requires_root("install", source, |source| LaunchdError::DirectoryCreation {
                    path: dir.clone(),
                    source,
                })
            })?;
        }

        let config_path = paths.config_file();
        if !config_path.exists() {
            Config::load(&config_path).map_err(|e| match e {
                ConfigError::Write { source, .. }
                    if source.kind() == io::ErrorKind::PermissionDenied =>
                {
                    LaunchdError::RequiresRoot("install")
                }
                other => LaunchdError::Config(other),
            })?;
        }

        let xml = DaemonPlist::new(binary, &paths.daemon_log()).to_xml()?;
        atomic_write(
            &self.plist_path,
            &xml,
            Some(fs::Permissions::from_mode(0o644)),
        )
        .map_err(|source| {
            requires_root("install", source, |source| LaunchdError::PlistWrite {
                path: self.plist_path.clone(),
                source,
            })
        })?;

        // A previous job may still be loaded.
        let _ = self.control.unload(&self.plist_path);
        self.control.load(&self.plist_path)?;

        tracing::info!("launchd daemon installed at {:?}", self.plist_path);
        Ok(())
    }

    /// Unloads the job, removes the plist and strips the hosts block.
    ///
    /// A missing plist is not an error. Failure to clean the hosts file is
    /// logged and does not fail the uninstall.
    ///
    /// # Errors
    /// Returns an error if the plist exists but cannot be removed.
    pub fn uninstall(&self, paths: &Paths) -> Result<()> {
        let _ = self.control.unload(&self.plist_path);

        match fs::remove_file(&self.plist_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("launchd plist does not exist, nothing to remove");
            }
            Err(source) => {
                return Err(requires_root("uninstall", source, |source| {
                    LaunchdError::PlistRemove {
                        path: self.plist_path.clone(),
                        source,
                    }
                }))
            }
        }

        if let Err(e) = HostsFile::new(&paths.hosts_file).remove_block() {
            tracing::warn!("Failed to clean {:?}: {}", paths.hosts_file, e);
        }

        tracing::info!("launchd daemon uninstalled");
        Ok(())
    }
}

fn requires_root(
    command: &'static str,
    source: io::Error,
    otherwise: impl FnOnce(io::Error) -> LaunchdError,
) -> LaunchdError {
    if source.kind() == io::ErrorKind::PermissionDenied {
        LaunchdError::RequiresRoot(command)
    } else {
        otherwise(source)
    }
}
