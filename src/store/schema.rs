//! SQLite schema and connection profile for the file catalog.

use rusqlite::Connection;
use std::path::Path;

use crate::store::StoreError;

/// Open (or create) the catalog at `path` and apply the bulk-load profile.
///
/// The profile trades immediate crash-durability for write throughput:
/// synchronous off and an in-memory journal during the load. A clean shutdown
/// flushes everything; after a crash mid-run the catalog is rebuilt by
/// re-scanning.
pub fn open_or_create(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let conn = Connection::open(path)?;
    conn.pragma_update(None, "synchronous", "OFF")?;
    // journal_mode returns its new value as a row, so it cannot go through
    // pragma_update.
    conn.query_row("PRAGMA journal_mode = MEMORY", [], |_row| Ok(()))?;
    conn.pragma_update(None, "cache_size", -64000)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            path TEXT NOT NULL UNIQUE,
            size INTEGER NOT NULL,
            mtime INTEGER NOT NULL
        );
        ",
    )?;

    Ok(conn)
}

/// Build the secondary indexes. Deferred until after bulk load so inserts do
/// not pay per-row index maintenance; idempotent.
pub fn create_indexes(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_files_name ON files(name);
        CREATE INDEX IF NOT EXISTS idx_files_path ON files(path);
        CREATE INDEX IF NOT EXISTS idx_files_size ON files(size);
        ",
    )?;
    Ok(())
}

/// Restore a durable profile once the load is committed.
pub fn finalize(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.execute_batch("PRAGMA optimize;")?;
    Ok(())
}
