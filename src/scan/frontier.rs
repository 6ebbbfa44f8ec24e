//! Depth-indexed frontier for the iterative breadth-first directory walk.

use std::path::PathBuf;

/// Hard upper bound on traversal depth. Terminates cyclic structures such as
/// symlink loops; a safety valve, not a tuning knob.
pub const DEFAULT_MAX_DEPTH: u32 = 64;

/// Depth at which the level parallelism is halved.
const HALVED_DEPTH: u32 = 16;

/// Depth beyond which levels are enumerated serially.
const SERIAL_DEPTH: u32 = 32;

/// The set of directories awaiting child-enumeration at the current depth.
#[derive(Debug)]
pub struct Frontier {
    dirs: Vec<PathBuf>,
    depth: u32,
}

impl Frontier {
    /// Seed the frontier with the scan root at depth 0.
    pub fn seed(root: PathBuf) -> Self {
        Self {
            dirs: vec![root],
            depth: 0,
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Replace the working set with the next level's survivors.
    pub fn advance(&mut self, next: Vec<PathBuf>) {
        self.dirs = next;
        self.depth += 1;
    }
}

/// Worker degree for a frontier level: full for shallow depths, halved at a mid
/// threshold, serial beyond a deep threshold. Bounds I/O pressure on
/// pathological trees.
pub fn level_parallelism(configured: usize, depth: u32) -> usize {
    let configured = configured.max(1);
    if depth < HALVED_DEPTH {
        configured
    } else if depth < SERIAL_DEPTH {
        (configured / 2).max(1)
    } else {
        1
    }
}
