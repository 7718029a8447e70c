//! Error types for launchd service management.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// launchd service management error type.
#[derive(Debug, Error)]
pub enum LaunchdError {
    /// The operation needs to write system locations.
    #[error("{0} requires root, run: sudo sc {0}")]
    RequiresRoot(&'static str),

    /// Failed to resolve the sc binary path.
    #[error("Failed to resolve sc binary path: {0}")]
    BinaryPathResolution(#[source] io::Error),

    /// Failed to create a directory.
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create the default configuration.
    #[error("Failed to create default config: {0}")]
    Config(#[from] ConfigError),

    /// Failed to write the plist file.
    #[error("Failed to write plist file {path}: {source}")]
    PlistWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to remove the plist file.
    #[error("Failed to remove plist file {path}: {source}")]
    PlistRemove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to serialize the plist.
    #[error("Failed to serialize plist: {0}")]
    PlistSerialize(#[source] plist::Error),

    /// Failed to execute launchctl.
    #[error("Failed to execute launchctl: {0}")]
    LaunchctlExecution(#[source] io::Error),

    /// launchctl refused to load the service.
    #[error("launchctl load failed: {0}")]
    ServiceLoad(String),

    /// launchctl refused to unload the service.
    #[error("launchctl unload failed: {0}")]
    ServiceUnload(String),
}

/// Result type for launchd operations.
pub type Result<T> = std::result::Result<T, LaunchdError>;
