//! Core types shared across the scan, ingest, and store stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One discovered file, keyed by its absolute path.
///
/// `path` is the natural key of the store: at most one row per path, and the
/// most recently written record for a path wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

impl FileRecord {
    /// Modification time as epoch seconds, the representation persisted in the store.
    pub fn mtime_epoch(&self) -> i64 {
        self.modified_at.timestamp()
    }
}

/// Terminal and in-flight states of a scan run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    #[default]
    Idle,
    Scanning,
    Completed,
    Cancelled,
    Failed,
}

/// Case-insensitive membership test over directory base names.
///
/// An empty set disables filtering entirely.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    names: HashSet<String>,
}

impl IgnoreSet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.names.is_empty() && self.names.contains(&name.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Shared cooperative-cancellation signal for a scan run.
///
/// Cloning shares the underlying flag. The scanner polls it between frontier
/// levels, between emission chunks, and inside per-item loops; in-flight work
/// for the current item is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Counters updated concurrently by scan workers.
///
/// Per-item filesystem failures are swallowed by the scanner; `errors_ignored`
/// is the diagnostic side-channel. It never inflates or deflates the discovery
/// counts, which only reflect successfully stat'ed files.
#[derive(Debug, Default)]
pub struct ScanStats {
    dirs_visited: AtomicU64,
    files_discovered: AtomicU64,
    bytes_discovered: AtomicU64,
    errors_ignored: AtomicU64,
}

impl ScanStats {
    pub fn record_dir(&self) {
        self.dirs_visited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file(&self, size: u64) {
        self.files_discovered.fetch_add(1, Ordering::Relaxed);
        self.bytes_discovered.fetch_add(size, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero all counters. Called at the start of a run so the stats always
    /// describe a single scan, not an accumulation.
    pub fn reset(&self) {
        self.dirs_visited.store(0, Ordering::Relaxed);
        self.files_discovered.store(0, Ordering::Relaxed);
        self.bytes_discovered.store(0, Ordering::Relaxed);
        self.errors_ignored.store(0, Ordering::Relaxed);
    }

    pub fn files_discovered(&self) -> u64 {
        self.files_discovered.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dirs_visited: self.dirs_visited.load(Ordering::Relaxed),
            files_discovered: self.files_discovered.load(Ordering::Relaxed),
            bytes_discovered: self.bytes_discovered.load(Ordering::Relaxed),
            errors_ignored: self.errors_ignored.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ScanStats`], suitable for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub dirs_visited: u64,
    pub files_discovered: u64,
    pub bytes_discovered: u64,
    pub errors_ignored: u64,
}
