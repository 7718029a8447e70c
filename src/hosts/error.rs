//! Hosts file error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or rewriting the hosts file.
#[derive(Debug, Error)]
pub enum HostsError {
    /// The process lacks the privileges to modify the hosts file.
    #[error("Permission denied for {path} (run the daemon as root)")]
    PermissionDenied { path: PathBuf },

    /// The hosts file could not be read.
    #[error("Failed to read hosts file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The rewritten hosts file could not be written or renamed into place.
    #[error("Failed to write hosts file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl HostsError {
    pub(crate) fn read(path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path }
        } else {
            Self::Read { path, source }
        }
    }

    pub(crate) fn write(path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path }
        } else {
            Self::Write { path, source }
        }
    }

    /// Returns true if the failure is a missing privilege.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// Result type for hosts file operations.
pub type Result<T> = std::result::Result<T, HostsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_mapped() {
        let err = HostsError::write(
            PathBuf::from("/etc/hosts"),
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("/etc/hosts"));
    }

    #[test]
    fn test_other_io_errors_keep_source() {
        let err = HostsError::read(
            PathBuf::from("/etc/hosts"),
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert!(!err.is_permission_denied());
        assert!(matches!(err, HostsError::Read { .. }));
    }
}
