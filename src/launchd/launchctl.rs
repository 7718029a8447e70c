//! `launchctl` command wrapper.

use std::path::Path;
use std::process::Command;

use super::error::{LaunchdError, Result};

/// Registers and unregisters launchd jobs.
pub trait ServiceControl {
    /// Loads the job described by `plist_path`.
    ///
    /// # Errors
    /// Returns an error if the job could not be loaded.
    fn load(&self, plist_path: &Path) -> Result<()>;

    /// Unloads the job described by `plist_path`.
    ///
    /// # Errors
    /// Returns an error if the job could not be unloaded, which includes the
    /// job not being loaded at all.
    fn unload(&self, plist_path: &Path) -> Result<()>;
}

/// [`ServiceControl`] backed by the `launchctl` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct Launchctl;

impl ServiceControl for Launchctl {
    fn load(&self, plist_path: &Path) -> Result<()> {
        let output = Command::new("launchctl")
            .arg("load")
            .arg(plist_path)
            .output()
            .map_err(LaunchdError::LaunchctlExecution)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LaunchdError::ServiceLoad(stderr.trim().to_string()));
        }

        tracing::debug!("launchctl load succeeded for {:?}", plist_path);
        Ok(())
    }

    fn unload(&self, plist_path: &Path) -> Result<()> {
        let output = Command::new("launchctl")
            .arg("unload")
            .arg(plist_path)
            .output()
            .map_err(LaunchdError::LaunchctlExecution)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!("launchctl unload failed (may be already unloaded): {}", stderr);
            return Err(LaunchdError::ServiceUnload(stderr.trim().to_string()));
        }

        tracing::debug!("launchctl unload succeeded for {:?}", plist_path);
        Ok(())
    }
}
