//! Core library for filedex.
//!
//! The pipeline has three stages with strict ownership boundaries:
//!
//! - [`scan`]: a two-phase parallel [`scan::DirectoryScanner`] that owns the
//!   traversal frontier and visited set for the duration of a run.
//! - [`ingest`]: the [`ingest::IngestQueue`], the only structure shared across
//!   threads — many producers, exactly one consumer.
//! - [`store`]: the [`store::BatchWriter`], a single consumer thread with
//!   exclusive ownership of the SQLite connection, committing records in
//!   batched transactions keyed by path.
//!
//! [`cli`] wires the stages together and is the only module that knows about
//! all three.

pub mod cli;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod scan;
pub mod store;
