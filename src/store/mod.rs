//! Durable persistence: SQLite schema and the single-consumer batch writer.

use std::path::PathBuf;

use thiserror::Error;

use crate::ingest::QueueError;

pub mod schema;
pub mod writer;

pub use writer::{BatchWriter, WriterReport, DEFAULT_BATCH_SIZE};

/// Writer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Uninitialized,
    Initialized,
    Started,
    Draining,
    Stopped,
}

impl std::fmt::Display for WriterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WriterState::Uninitialized => "uninitialized",
            WriterState::Initialized => "initialized",
            WriterState::Started => "started",
            WriterState::Draining => "draining",
            WriterState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Lifecycle misuse, distinct from storage failures.
    #[error("cannot {action} while the writer is {state}")]
    InvalidState {
        action: &'static str,
        state: WriterState,
    },
    #[error("could not create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not spawn the writer thread: {0}")]
    Spawn(std::io::Error),
    #[error("the writer thread panicked")]
    WriterPanicked,
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
