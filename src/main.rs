//! filedex: Index a directory tree into a searchable SQLite catalog
//!
//! A two-phase parallel scanner discovers files under a root path and streams
//! their metadata through an ingest queue to a single batched writer, which
//! upserts them into a SQLite catalog.

use anyhow::Result;

fn main() -> Result<()> {
    filedex::cli::run()
}
