//! Two-phase directory discovery.

pub mod frontier;
pub mod scanner;

pub use frontier::DEFAULT_MAX_DEPTH;
pub use scanner::{DirectoryScanner, ScanError, ScanOptions};
