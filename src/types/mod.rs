//! Wire types for the control channel.
//!
//! Requests and responses are single-line JSON objects:
//!
//! - request: `{"command": "unblock", "args": {"domains": "a.com", "duration": "15m"}}`
//! - response: `{"ok": true, "data": {...}, "error": null}`

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// Command
// ============================================================================

/// Commands understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Unblock,
    Reblock,
    Add,
    Remove,
    List,
}

impl Command {
    /// Returns the wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Unblock => "unblock",
            Command::Reblock => "reblock",
            Command::Add => "add",
            Command::Remove => "remove",
            Command::List => "list",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a command name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(Command::Status),
            "unblock" => Ok(Command::Unblock),
            "reblock" => Ok(Command::Reblock),
            "add" => Ok(Command::Add),
            "remove" => Ok(Command::Remove),
            "list" => Ok(Command::List),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

// ============================================================================
// IpcRequest
// ============================================================================

/// Argument key carrying a comma-joined domain list.
pub const ARG_DOMAINS: &str = "domains";

/// Argument key carrying a humantime duration literal.
pub const ARG_DURATION: &str = "duration";

/// IPC request from client to daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcRequest {
    /// Command name
    pub command: String,
    /// String arguments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
}

impl IpcRequest {
    /// Creates a request without arguments.
    pub fn new(command: Command) -> Self {
        Self {
            command: command.as_str().to_string(),
            args: BTreeMap::new(),
        }
    }

    /// Adds an argument. Empty values are dropped.
    pub fn with_arg(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.args.insert(key.to_string(), value);
        }
        self
    }

    /// Adds the comma-joined `domains` argument.
    pub fn with_domains(self, domains: &[String]) -> Self {
        self.with_arg(ARG_DOMAINS, domains.join(","))
    }

    pub fn status() -> Self {
        Self::new(Command::Status)
    }

    pub fn list() -> Self {
        Self::new(Command::List)
    }

    pub fn unblock(domains: &[String], duration: Duration) -> Self {
        Self::new(Command::Unblock)
            .with_domains(domains)
            .with_arg(ARG_DURATION, humantime::format_duration(duration).to_string())
    }

    pub fn reblock(domains: &[String]) -> Self {
        Self::new(Command::Reblock).with_domains(domains)
    }

    pub fn add(domains: &[String]) -> Self {
        Self::new(Command::Add).with_domains(domains)
    }

    pub fn remove(domains: &[String]) -> Self {
        Self::new(Command::Remove).with_domains(domains)
    }

    /// Returns a non-empty argument value.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Returns the normalized `domains` argument (empty if absent).
    pub fn domains(&self) -> Vec<String> {
        self.arg(ARG_DOMAINS)
            .map(crate::config::split_domains)
            .unwrap_or_default()
    }
}

// ============================================================================
// IpcResponse
// ============================================================================

/// IPC response from daemon to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Whether the command succeeded
    pub ok: bool,
    /// Command-specific payload
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Error message when `ok` is false
    #[serde(default)]
    pub error: Option<String>,
}

impl IpcResponse {
    /// Creates a success response carrying `data`.
    pub fn success<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                ok: true,
                data: Some(value),
                error: None,
            },
            Err(e) => Self::error(format!("failed to encode response: {e}")),
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Decodes the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns the error message for `ok: false` responses, or a decode error.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, String> {
        if !self.ok {
            return Err(self.error.unwrap_or_else(|| "unknown error".to_string()));
        }
        let value = self.data.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value).map_err(|e| format!("unexpected response data: {e}"))
    }
}

// ============================================================================
// Response Data
// ============================================================================

/// Block state of one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainState {
    Blocked,
    Unblocked,
}

impl DomainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainState::Blocked => "blocked",
            DomainState::Unblocked => "unblocked",
        }
    }
}

/// One row of `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub domain: String,
    pub state: DomainState,
    /// Remaining unblock time, e.g. `14m 59s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusData {
    pub uptime: String,
    pub domains: Vec<StatusEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnblockData {
    pub domains: Vec<String>,
    /// Effective duration after capping
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReblockData {
    pub domains: Vec<String>,
}

/// Result of `add` and `remove`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutateData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    /// The full block list after the change
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListData {
    pub domains: Vec<String>,
}

/// Formats a duration rounded to whole seconds, e.g. `14m 59s`.
pub fn format_remaining(d: Duration) -> String {
    let millis = d.as_millis();
    let secs = u64::try_from((millis + 500) / 1000).unwrap_or(u64::MAX);
    if secs == 0 {
        return "0s".to_string();
    }
    humantime::format_duration(Duration::from_secs(secs)).to_string()
}

// ============================================================================
// Tests
// ============================================================================
