//! Command definitions for the sc CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::audit::Period;

// ============================================================================
// CLI Structure
// ============================================================================

/// sc - block distracting websites by default, unblock them on a timer
#[derive(Parser, Debug)]
#[command(
    name = "sc",
    version,
    about = "Block distracting websites by default, temporarily unblock with timers",
    long_about = "Keeps a list of domains blocked through the hosts file.\n\
                  A background daemon lifts blocks for a limited time and restores them when the timer runs out.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show blocked/unblocked status of all domains
    Status,

    /// Temporarily unblock domains (all if none specified)
    Unblock(UnblockArgs),

    /// Immediately reblock domains (all if none specified)
    Reblock {
        /// Domains to reblock
        domains: Vec<String>,
    },

    /// Add domains to the block list
    Add {
        /// Domains to add
        #[arg(required = true)]
        domains: Vec<String>,
    },

    /// Remove domains from the block list
    Remove {
        /// Domains to remove
        #[arg(required = true)]
        domains: Vec<String>,
    },

    /// List all blocked domains
    List,

    /// Show unblock/reblock history and stats
    Logs(LogsArgs),

    /// Show or edit the configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Run the sc daemon in the foreground
    Daemon,

    /// Install the launchd daemon (requires sudo)
    Install,

    /// Remove the launchd daemon and clean the hosts file (requires sudo)
    Uninstall,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// `sc config` actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the configuration file
    Show,
    /// Print the configuration file path
    Path,
    /// Open the configuration in $EDITOR
    Edit,
}

// ============================================================================
// Unblock Command Arguments
// ============================================================================

/// Arguments for the unblock command
#[derive(Args, Debug, Clone, Default)]
pub struct UnblockArgs {
    /// Domains followed by an optional duration (e.g. `reddit.com 15m`)
    #[arg(value_name = "DOMAIN... [DURATION]")]
    pub args: Vec<String>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

impl UnblockArgs {
    /// Splits the positional arguments into domains and a duration.
    ///
    /// The last argument is taken as the duration when it parses as one.
    pub fn split(&self) -> (Vec<String>, Option<Duration>) {
        split_unblock_args(&self.args)
    }
}

/// Splits `[DOMAIN...] [DURATION]` positional arguments.
pub fn split_unblock_args(args: &[String]) -> (Vec<String>, Option<Duration>) {
    match args.split_last() {
        Some((last, rest)) => match humantime::parse_duration(last) {
            Ok(duration) => (rest.to_vec(), Some(duration)),
            Err(_) => (args.to_vec(), None),
        },
        None => (Vec::new(), None),
    }
}

// ============================================================================
// Logs Command Arguments
// ============================================================================

/// Arguments for the logs command
#[derive(Args, Debug, Clone, Default)]
pub struct LogsArgs {
    /// Only show events for this domain
    #[arg(long)]
    pub domain: Option<String>,

    /// Time period to include
    #[arg(long, value_enum, default_value_t = Period::All)]
    pub period: Period,
}

// ============================================================================
// Tests
// ============================================================================
