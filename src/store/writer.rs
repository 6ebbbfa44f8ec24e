//! Single-consumer batch writer owning the catalog connection.
//!
//! All writes go through one dedicated `std::thread` that owns the SQLite
//! connection for its whole life, so transaction boundaries never race. Scan
//! workers only ever touch the ingest queue.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use rusqlite::{params, Connection};

use crate::domain::FileRecord;
use crate::ingest::IngestQueue;
use crate::store::schema;
use crate::store::{StoreError, WriterState};

/// Records accumulated per transaction when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Outcome of a completed drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterReport {
    pub records_written: u64,
}

type ConsumerResult = Result<(Connection, u64), StoreError>;

/// Batches, upserts, and commits records pulled from the ingest queue.
///
/// Lifecycle: `Uninitialized → Initialized → Started → Draining → Stopped`.
/// Out-of-order lifecycle calls fail with [`StoreError::InvalidState`] rather
/// than touching storage.
pub struct BatchWriter {
    state: Mutex<WriterState>,
    queue: Arc<IngestQueue>,
    batch_size: usize,
    conn: Mutex<Option<Connection>>,
    handle: Mutex<Option<JoinHandle<ConsumerResult>>>,
}

impl BatchWriter {
    pub fn new(queue: Arc<IngestQueue>, batch_size: usize) -> Self {
        Self {
            state: Mutex::new(WriterState::Uninitialized),
            queue,
            batch_size: batch_size.max(1),
            conn: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WriterState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records still buffered in the handoff queue. Deliberately excludes the
    /// in-flight batch the consumer has already pulled.
    pub fn pending_count(&self) -> usize {
        self.queue.depth()
    }

    /// Open or create the store at `destination` and prepare the schema.
    pub fn initialize(&self, destination: &Path) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != WriterState::Uninitialized {
            return Err(StoreError::InvalidState {
                action: "initialize",
                state: *state,
            });
        }
        let conn = schema::open_or_create(destination)?;
        *self.conn.lock().unwrap_or_else(PoisonError::into_inner) = Some(conn);
        *state = WriterState::Initialized;
        Ok(())
    }

    /// Launch the consumer loop on its own thread. Double-start fails.
    pub fn start(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != WriterState::Initialized {
            return Err(StoreError::InvalidState {
                action: "start",
                state: *state,
            });
        }
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(StoreError::InvalidState {
                action: "start",
                state: *state,
            })?;

        let queue = Arc::clone(&self.queue);
        let batch_size = self.batch_size;
        let handle = thread::Builder::new()
            .name("catalog-writer".into())
            .spawn(move || consumer_loop(conn, queue, batch_size))
            .map_err(StoreError::Spawn)?;

        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        *state = WriterState::Started;
        Ok(())
    }

    /// Hand a record to the consumer. Rejected unless the writer is `Started`,
    /// even though the record itself travels through the ingest queue.
    pub fn enqueue(&self, record: FileRecord) -> Result<(), StoreError> {
        let state = self.state();
        if state != WriterState::Started {
            return Err(StoreError::InvalidState {
                action: "enqueue",
                state,
            });
        }
        self.queue.enqueue(record)?;
        Ok(())
    }

    /// Close the queue, wait for the consumer to drain and commit everything,
    /// then build the secondary indexes and restore the durable profile.
    ///
    /// Returns only once the final commit is on disk. A consumer-loop failure
    /// (a rolled-back batch) is surfaced here instead of success.
    pub fn stop(&self) -> Result<WriterReport, StoreError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != WriterState::Started {
                return Err(StoreError::InvalidState {
                    action: "stop",
                    state: *state,
                });
            }
            *state = WriterState::Draining;
        }

        self.queue.close();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let outcome = match handle {
            Some(handle) => handle.join().map_err(|_| StoreError::WriterPanicked)?,
            None => Err(StoreError::WriterPanicked),
        };

        let result = outcome.and_then(|(conn, written)| {
            schema::create_indexes(&conn)?;
            schema::finalize(&conn)?;
            Ok(WriterReport {
                records_written: written,
            })
        });

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = WriterState::Stopped;
        result
    }
}

impl std::fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriter")
            .field("state", &self.state())
            .field("batch_size", &self.batch_size)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Pulls records until end-of-stream, committing one transaction per batch.
/// Returns the connection so the caller can finalize it after the drain.
///
/// A failed flush does not stop the loop from receiving: with a bounded
/// queue, producers blocked in `send` would otherwise never wake up and
/// `stop()` could never run to report the failure. Instead the loop keeps
/// draining and discarding until end-of-stream, then returns the error.
fn consumer_loop(mut conn: Connection, queue: Arc<IngestQueue>, batch_size: usize) -> ConsumerResult {
    let mut batch: Vec<FileRecord> = Vec::with_capacity(batch_size);
    let mut written = 0u64;

    while let Some(record) = queue.recv() {
        batch.push(record);
        if batch.len() >= batch_size {
            match flush_batch(&mut conn, &batch) {
                Ok(()) => {
                    written += batch.len() as u64;
                    batch.clear();
                }
                Err(err) => {
                    tracing::error!(error = %err, "batch commit failed, discarding the rest of the stream");
                    while queue.recv().is_some() {}
                    return Err(err);
                }
            }
        }
    }
    // Close-with-remainder: commit whatever is left before reporting done.
    // End-of-stream means no producer can still be blocked, so an error here
    // can return immediately.
    if !batch.is_empty() {
        flush_batch(&mut conn, &batch)?;
        written += batch.len() as u64;
    }

    tracing::debug!(records = written, "catalog writer drained");
    Ok((conn, written))
}

/// Upsert every record of the batch inside one transaction, keyed by `path`.
/// Any failure unwinds the transaction: the whole batch rolls back.
fn flush_batch(conn: &mut Connection, batch: &[FileRecord]) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO files (name, path, size, mtime) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                 name = excluded.name,
                 size = excluded.size,
                 mtime = excluded.mtime",
        )?;
        for record in batch {
            stmt.execute(params![
                record.name,
                record.path,
                record.size as i64,
                record.mtime_epoch(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}
