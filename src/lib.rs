//! sc library
//!
//! Core functionality of the sc site blocker:
//! - Hosts-file enforcement of the block list
//! - Daemon with persistent unblock timers and a periodic reconciler
//! - IPC server/client for daemon-CLI communication
//! - CLI command parsing and display utilities
//! - Configuration, audit log and DNS cache flushing
//! - launchd daemon installation (macOS)

pub mod audit;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod dns;
pub mod fsutil;
pub mod hosts;
pub mod launchd;
pub mod types;

// Re-export commonly used types for convenience
pub use audit::{AuditEntry, AuditSink, JsonlAuditLog, MemoryAuditLog, ReblockReason};
pub use config::{Config, Paths, Settings};
pub use daemon::{BlockEngine, IpcServer, ReconcileReport, Reconciler, RequestHandler, TimerStore};
pub use dns::{CacheFlusher, MockCacheFlusher, SystemDnsFlusher};
pub use hosts::{EnforcementSink, HostsFile, MemoryHosts};
pub use types::{Command, IpcRequest, IpcResponse};
