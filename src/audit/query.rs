//! Reading the audit log back and summarizing it.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};

use super::{AuditEntry, AuditError, AuditEvent};

/// Time window for [`query`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Period {
    /// Since local midnight
    Today,
    /// The last 7 days
    Week,
    /// The last 30 days
    Month,
    /// Everything
    #[default]
    All,
}

impl Period {
    /// Earliest timestamp included in this window, or `None` for no bound.
    pub fn cutoff<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Option<DateTime<Utc>> {
        match self {
            Period::Today => {
                let midnight = now.date_naive().and_hms_opt(0, 0, 0)?;
                now.timezone()
                    .from_local_datetime(&midnight)
                    .earliest()
                    .map(|t| t.with_timezone(&Utc))
            }
            Period::Week => Some((now - chrono::Duration::days(7)).with_timezone(&Utc)),
            Period::Month => Some((now - chrono::Duration::days(30)).with_timezone(&Utc)),
            Period::All => None,
        }
    }
}

/// Filters for [`query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub domain: Option<String>,
    pub period: Period,
}

/// Reads the audit log, keeping entries that match `opts`.
///
/// A missing file yields no entries. Lines that fail to parse are skipped.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn query(path: &Path, opts: &QueryOptions) -> Result<Vec<AuditEntry>, AuditError> {
    query_at(path, opts, Local::now())
}

/// [`query`] with an explicit clock reading.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn query_at<Tz: TimeZone>(
    path: &Path,
    opts: &QueryOptions,
    now: DateTime<Tz>,
) -> Result<Vec<AuditEntry>, AuditError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(AuditError::Open {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let cutoff = opts.period.cutoff(now);
    let domain = opts.domain.as_deref().map(crate::config::normalize_domain);

    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping malformed audit line: {}", e);
                continue;
            }
        };
        if cutoff.is_some_and(|c| entry.timestamp < c) {
            continue;
        }
        if domain.as_ref().is_some_and(|d| *d != entry.domain) {
            continue;
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Per-domain unblock statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainStats {
    pub domain: String,
    pub unblocks: usize,
    /// Sum of unblock-to-reblock intervals
    pub total_time: Duration,
    pub last_unblock: Option<DateTime<Utc>>,
}

/// Summarizes `entries` per domain, most unblocked first.
///
/// The n-th unblock of a domain is paired with its n-th reblock to compute
/// time spent unblocked. Domains that were never unblocked are omitted.
pub fn stats(entries: &[AuditEntry]) -> Vec<DomainStats> {
    let mut unblocks: BTreeMap<&str, Vec<DateTime<Utc>>> = BTreeMap::new();
    let mut reblocks: BTreeMap<&str, Vec<DateTime<Utc>>> = BTreeMap::new();

    for entry in entries {
        let times = match entry.event {
            AuditEvent::Unblock => unblocks.entry(&entry.domain).or_default(),
            AuditEvent::Reblock => reblocks.entry(&entry.domain).or_default(),
        };
        times.push(entry.timestamp);
    }

    let mut result: Vec<DomainStats> = unblocks
        .into_iter()
        .map(|(domain, starts)| {
            let ends = reblocks.get(domain).map(Vec::as_slice).unwrap_or_default();
            let total_time = starts
                .iter()
                .zip(ends)
                .filter_map(|(start, end)| (*end - *start).to_std().ok())
                .sum();
            DomainStats {
                domain: domain.to_string(),
                unblocks: starts.len(),
                total_time,
                last_unblock: starts.iter().max().copied(),
            }
        })
        .collect();

    // BTreeMap order keeps ties alphabetical
    result.sort_by(|a, b| b.unblocks.cmp(&a.unblocks));
    result
}

/// Formats a duration compactly: `42s`, `15m`, `2h`, `1h30m`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        return format!("{secs}s");
    }
    if secs < 3600 {
        return format!("{}m", secs / 60);
    }
    let hours = secs / 3600;
    let minutes = (secs / 60) % 60;
    if minutes == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h{minutes}m")
    }
}
