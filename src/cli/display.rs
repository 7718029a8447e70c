//! Display utilities for the sc CLI.
//!
//! Every `show_*` function prints what the matching `format_*` function
//! renders, so output can be checked without capturing stdout.

use std::path::Path;
use std::time::Duration;

use chrono::Local;

use crate::audit::{format_duration, AuditEntry, AuditEvent, DomainStats, ReblockReason};
use crate::config::Paths;
use crate::types::{MutateData, ReblockData, StatusData, UnblockData};

/// Number of audit events listed under the statistics table
const RECENT_EVENTS: usize = 20;

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows uptime and the per-domain status table.
    pub fn show_status(data: &StatusData) {
        print!("{}", Self::format_status(data));
    }

    pub fn format_status(data: &StatusData) -> String {
        let mut out = format!("Uptime: {}\n\n", data.uptime);
        if data.domains.is_empty() {
            out.push_str("No domains configured. Use: sc add <domain>\n");
            return out;
        }

        let rows: Vec<Vec<String>> = data
            .domains
            .iter()
            .map(|entry| {
                vec![
                    entry.domain.clone(),
                    entry.state.as_str().to_string(),
                    entry.remaining.clone().unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();
        out.push_str(&format_table(&["DOMAIN", "STATE", "REMAINING"], &rows));
        out
    }

    /// Shows the notice printed when a requested duration is capped.
    pub fn show_cap_notice(requested: Duration, max: Duration) {
        println!(
            "Requested duration {} exceeds max allowed {}, capping.",
            humantime::format_duration(requested),
            humantime::format_duration(max)
        );
    }

    pub fn show_unblocked(data: &UnblockData) {
        print!("{}", Self::format_unblocked(data));
    }

    pub fn format_unblocked(data: &UnblockData) -> String {
        data.domains
            .iter()
            .map(|domain| format!("Unblocked {} for {}\n", domain, data.duration))
            .collect()
    }

    pub fn show_reblocked(data: &ReblockData) {
        print!("{}", Self::format_reblocked(data));
    }

    pub fn format_reblocked(data: &ReblockData) -> String {
        if data.domains.is_empty() {
            return "No domains were unblocked\n".to_string();
        }
        data.domains
            .iter()
            .map(|domain| format!("Reblocked {domain}\n"))
            .collect()
    }

    pub fn show_added(data: &MutateData) {
        print!("{}", Self::format_added(data));
    }

    pub fn format_added(data: &MutateData) -> String {
        if data.added.is_empty() {
            return "All domains already in block list\n".to_string();
        }
        data.added
            .iter()
            .map(|domain| format!("Added {domain}\n"))
            .collect()
    }

    pub fn show_removed(data: &MutateData) {
        print!("{}", Self::format_removed(data));
    }

    pub fn format_removed(data: &MutateData) -> String {
        if data.removed.is_empty() {
            return "No matching domains found\n".to_string();
        }
        data.removed
            .iter()
            .map(|domain| format!("Removed {domain}\n"))
            .collect()
    }

    /// Shows the block list, one domain per line.
    pub fn show_list(domains: &[String]) {
        if domains.is_empty() {
            println!("No domains configured");
            return;
        }
        for domain in domains {
            println!("{domain}");
        }
    }

    /// Shows the statistics table followed by the most recent events.
    pub fn show_logs(entries: &[AuditEntry], stats: &[DomainStats]) {
        print!("{}", Self::format_logs(entries, stats));
    }

    pub fn format_logs(entries: &[AuditEntry], stats: &[DomainStats]) -> String {
        if entries.is_empty() {
            return "No log entries found\n".to_string();
        }

        let mut out = String::new();
        if !stats.is_empty() {
            let rows: Vec<Vec<String>> = stats
                .iter()
                .map(|s| {
                    vec![
                        s.domain.clone(),
                        s.unblocks.to_string(),
                        format_duration(s.total_time),
                        s.last_unblock
                            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    ]
                })
                .collect();
            out.push_str(&format_table(
                &["DOMAIN", "UNBLOCKS", "TOTAL TIME", "LAST UNBLOCK"],
                &rows,
            ));
            out.push('\n');
        }

        out.push_str(&format!("Recent events ({} total):\n", entries.len()));
        let start = entries.len().saturating_sub(RECENT_EVENTS);
        for entry in &entries[start..] {
            let ts = entry.timestamp.with_timezone(&Local).format("%b %d %H:%M");
            let line = match entry.event {
                AuditEvent::Unblock => format!(
                    "  {}  unblock  {:<20}  for {}\n",
                    ts,
                    entry.domain,
                    entry.duration.as_deref().unwrap_or("-")
                ),
                AuditEvent::Reblock => format!(
                    "  {}  reblock  {:<20}  ({})\n",
                    ts,
                    entry.domain,
                    entry.reason.unwrap_or(ReblockReason::Manual).as_str()
                ),
            };
            out.push_str(&line);
        }
        out
    }

    /// Shows the raw configuration file, or a hint when it does not exist.
    pub fn show_config(path: &Path, contents: Option<&str>) {
        match contents {
            Some(contents) => {
                println!("# {}", path.display());
                print!("{contents}");
                if !contents.ends_with('\n') {
                    println!();
                }
            }
            None => {
                println!("No config file found at {}", path.display());
                println!("Run 'sudo sc install' or 'sc daemon' to create a default config.");
            }
        }
    }

    /// Shows a success message for launchd installation.
    pub fn show_install_success(plist: &Path, paths: &Paths) {
        println!("Installed and started.");
        println!("  Plist:  {}", plist.display());
        println!("  Log:    {}", paths.daemon_log().display());
        println!("  Config: {}", paths.config_file().display());
        println!("  Socket: {}", paths.socket().display());
    }

    /// Shows a success message for launchd removal.
    pub fn show_uninstall_success() {
        println!("Uninstalled. Daemon stopped, plist removed, hosts file cleaned.");
    }

    /// Shows a warning on stderr.
    pub fn show_warning(message: &str) {
        eprintln!("Warning: {}", message);
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("Error: {}", message);
    }
}

/// Left-aligns `rows` under `headers` with two spaces between columns.
fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<&str>| {
        let last = cells.len().saturating_sub(1);
        let mut line = String::new();
        for (i, cell) in cells.into_iter().enumerate() {
            if i == last {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{:<width$}  ", cell, width = widths[i]));
            }
        }
        line.push('\n');
        line
    };

    let mut out = render(headers.to_vec());
    for row in rows {
        out.push_str(&render(row.iter().map(String::as_str).collect()));
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
