//! # Clock Gate
//!
//! Decides, from a single persisted timestamp, whether a maintenance cycle
//! is due. The record is one RFC 3339 line in a well-known file; it is read
//! before any cycle decision and written only after a cycle fully completes.
//!
//! ## Failure Posture:
//! A missing or unparsable record is treated as "never run", not as an
//! error, so the gate fails open toward cleaning. The gate itself performs
//! no deletions and has no other side effects.

use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persisted maintenance record with an injectable path.
///
/// Reified as an explicit store (rather than a module-level constant path)
/// so tests and multi-instance deployments can point it anywhere. The file
/// is created lazily on the first `record_run`.
#[derive(Debug, Clone)]
pub struct MaintenanceStore {
    record_path: PathBuf,
}

impl MaintenanceStore {
    pub fn new(record_path: impl Into<PathBuf>) -> Self {
        Self {
            record_path: record_path.into(),
        }
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Read the last completed cycle timestamp, if a valid one exists.
    ///
    /// Any failure mode (no file, unreadable, garbage content) collapses to
    /// `None`; the caller decides what that means.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        let raw = fs::read_to_string(&self.record_path).ok()?;
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                warn!(
                    path = %self.record_path.display(),
                    error = %e,
                    "Maintenance record is unparsable, treating as never run"
                );
                None
            }
        }
    }

    /// True iff no valid record exists or `now - last_run >= interval`.
    pub fn is_cycle_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_run() {
            Some(last) => now.signed_duration_since(last) >= interval,
            None => true,
        }
    }

    /// Time remaining until the next cycle, or `None` when one is due
    /// immediately (no record, corrupt record, or interval elapsed).
    pub fn time_until_next_cycle(&self, now: DateTime<Utc>, interval: Duration) -> Option<Duration> {
        let last = self.last_run()?;
        let remaining = interval - now.signed_duration_since(last);
        if remaining > Duration::zero() {
            Some(remaining)
        } else {
            None
        }
    }

    /// Persist `now` as the last completed cycle.
    ///
    /// Written to a sibling temp file and renamed so a concurrent reader
    /// never observes a half-written timestamp. The record only moves
    /// forward in practice because it is written at cycle completion.
    pub fn record_run(&self, now: DateTime<Utc>) -> std::io::Result<()> {
        if let Some(parent) = self.record_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.record_path.with_extension("tmp");
        fs::write(&tmp, now.to_rfc3339())?;
        fs::rename(&tmp, &self.record_path)?;
        debug!(path = %self.record_path.display(), "Maintenance record updated");
        Ok(())
    }
}
