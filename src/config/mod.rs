//! Configuration loading and merging
//!
//! Handles loading from config files and CLI arguments with proper
//! precedence (CLI > File > Defaults).

use serde::Deserialize;
use std::path::PathBuf;

use crate::scan::DEFAULT_MAX_DEPTH;
use crate::store::DEFAULT_BATCH_SIZE;

pub mod loader;
pub mod merge;

pub use loader::load_settings;
pub use merge::{merge_cli_with_settings, CliOverrides};

/// Directory base names pruned by default. Overridable from config or CLI.
pub fn default_ignore_names() -> Vec<String> {
    [".git", "node_modules", "__pycache__", ".venv", "venv", "target"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".filedex/catalog.sqlite")
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

/// Everything the pipeline needs that the core does not own itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite destination for the catalog.
    pub db: PathBuf,
    /// Scan worker count; 0 means one per available core.
    pub threads: usize,
    /// Records committed per writer transaction.
    pub batch_size: usize,
    /// Ingest queue bound; absent means unbounded (no producer backpressure).
    pub queue_capacity: Option<usize>,
    /// Traversal depth cap.
    pub max_depth: u32,
    /// Directory base names to skip, case-insensitive.
    pub ignore: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db: default_db_path(),
            threads: 0,
            batch_size: default_batch_size(),
            queue_capacity: None,
            max_depth: default_max_depth(),
            ignore: default_ignore_names(),
        }
    }
}
