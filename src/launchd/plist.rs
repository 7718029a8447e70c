//! Property list for the sc launchd daemon.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{LaunchdError, Result};

/// launchd job definition for `sc daemon`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonPlist {
    #[serde(rename = "Label")]
    pub label: String,

    /// Program to execute with its arguments
    #[serde(rename = "ProgramArguments")]
    pub program_arguments: Vec<String>,

    /// Start at boot
    #[serde(rename = "RunAtLoad")]
    pub run_at_load: bool,

    /// Restart whenever the process exits
    #[serde(rename = "KeepAlive")]
    pub keep_alive: bool,

    #[serde(rename = "StandardOutPath")]
    pub standard_out_path: String,

    #[serde(rename = "StandardErrorPath")]
    pub standard_error_path: String,
}

impl DaemonPlist {
    /// Service label of the sc daemon.
    pub const LABEL: &'static str = "com.sc.daemon";

    /// Creates the job definition running `<binary_path> daemon`, with both
    /// output streams appended to `log_path`.
    pub fn new(binary_path: &Path, log_path: &Path) -> Self {
        let log_path = log_path.to_string_lossy().into_owned();
        Self {
            label: Self::LABEL.to_string(),
            program_arguments: vec![
                binary_path.to_string_lossy().into_owned(),
                "daemon".to_string(),
            ],
            run_at_load: true,
            keep_alive: true,
            standard_out_path: log_path.clone(),
            standard_error_path: log_path,
        }
    }

    /// Generates the plist XML.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        plist::to_writer_xml(&mut buf, self).map_err(LaunchdError::PlistSerialize)?;
        Ok(buf)
    }
}
