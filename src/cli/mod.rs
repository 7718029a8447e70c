//! CLI module for sc.
//!
//! This module provides the command-line interface:
//! - `commands`: Command definitions using clap derive
//! - `client`: IPC client for daemon communication
//! - `display`: Output formatting and display logic
//! - `prompt`: Confirmation prompts before unblocking

pub mod client;
pub mod commands;
pub mod display;
pub mod prompt;

pub use client::{ClientError, IpcClient};
pub use commands::{split_unblock_args, Cli, Commands, ConfigAction, LogsArgs, UnblockArgs};
pub use display::Display;
pub use prompt::{confirm_unblock, unblock_target};
