//! Two-phase parallel directory scanner.
//!
//! Phase 1 collects the directory structure breadth-first through a
//! depth-indexed frontier; phase 2 walks the collected set in fixed-size
//! chunks and emits one [`FileRecord`] per regular file. Separating the two
//! phases keeps the I/O patterns uniform within each phase.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use thiserror::Error;

use crate::domain::{CancelFlag, FileRecord, IgnoreSet, ScanStats, ScanStatus};
use crate::scan::frontier::{level_parallelism, Frontier, DEFAULT_MAX_DEPTH};

/// Directories processed per phase-2 chunk. The scanner yields between chunks
/// so large trees do not pin a whole level of listings in memory at once.
const EMIT_CHUNK_DIRS: usize = 256;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("a scan is already in progress")]
    AlreadyScanning,
    #[error("scan root {path} is not a directory")]
    NotADirectory { path: PathBuf },
    #[error("failed to resolve scan root {path}: {source}")]
    Root {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to build scan thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Knobs threaded in from the CLI/config layer.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Worker count for shallow levels; 0 means one per available core.
    pub threads: usize,
    /// Hard traversal depth cap.
    pub max_depth: u32,
    /// Directory base names to prune, matched case-insensitively.
    pub ignore: IgnoreSet,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            ignore: IgnoreSet::default(),
        }
    }
}

impl ScanOptions {
    fn effective_threads(&self) -> usize {
        match self.threads {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            n => n,
        }
    }
}

/// Discovers files under a root and pushes them to a caller-supplied sink.
///
/// Holds no state across runs beyond the last terminal status and the run's
/// counters; the frontier and visited set live only for the duration of
/// [`DirectoryScanner::start_scan`].
#[derive(Debug, Default)]
pub struct DirectoryScanner {
    status: Mutex<ScanStatus>,
    stats: Arc<ScanStats>,
}

impl DirectoryScanner {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(ScanStatus::Idle),
            stats: Arc::new(ScanStats::default()),
        }
    }

    pub fn status(&self) -> ScanStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counters for the current or most recent run.
    pub fn stats(&self) -> Arc<ScanStats> {
        Arc::clone(&self.stats)
    }

    /// Run a full two-phase scan, invoking `emit` once per discovered file.
    ///
    /// Blocks until the run reaches a terminal status. Returns
    /// [`ScanError::AlreadyScanning`] if another scan is in flight on this
    /// scanner. Per-item filesystem failures are swallowed (skipped, counted);
    /// cancellation yields `Ok(ScanStatus::Cancelled)` with whatever was
    /// emitted so far left intact.
    pub fn start_scan<F>(
        &self,
        root: &Path,
        options: &ScanOptions,
        cancel: &CancelFlag,
        emit: F,
    ) -> Result<ScanStatus, ScanError>
    where
        F: Fn(FileRecord) + Send + Sync,
    {
        {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            if *status == ScanStatus::Scanning {
                return Err(ScanError::AlreadyScanning);
            }
            *status = ScanStatus::Scanning;
            self.stats.reset();
        }

        let outcome = self.run(root, options, cancel, &emit);
        let terminal = match &outcome {
            Ok(status) => *status,
            Err(_) => ScanStatus::Failed,
        };
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = terminal;
        outcome
    }

    fn run<F>(
        &self,
        root: &Path,
        options: &ScanOptions,
        cancel: &CancelFlag,
        emit: &F,
    ) -> Result<ScanStatus, ScanError>
    where
        F: Fn(FileRecord) + Send + Sync,
    {
        let root = root.canonicalize().map_err(|source| ScanError::Root {
            path: root.to_path_buf(),
            source,
        })?;
        if !root.is_dir() {
            return Err(ScanError::NotADirectory { path: root });
        }

        let threads = options.effective_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("scan-{i}"))
            .build()?;

        let visited = self.collect_directories(&pool, root, options, cancel, threads);
        self.emit_files(&pool, &visited, cancel, emit);

        Ok(if cancel.is_cancelled() {
            ScanStatus::Cancelled
        } else {
            ScanStatus::Completed
        })
    }

    /// Phase 1: breadth-first expansion of the directory frontier.
    ///
    /// Each level is listed with a parallelism degree derived from its depth.
    /// Survivors (not ignored, not seen before) join both the next frontier
    /// and the cumulative visited set; the depth cap ends traversal even when
    /// symlink cycles keep producing fresh paths.
    fn collect_directories(
        &self,
        pool: &rayon::ThreadPool,
        root: PathBuf,
        options: &ScanOptions,
        cancel: &CancelFlag,
        threads: usize,
    ) -> Vec<PathBuf> {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        seen.insert(root.clone());
        let mut visited = vec![root.clone()];
        let mut frontier = Frontier::seed(root);

        while !frontier.is_empty() && !cancel.is_cancelled() {
            if frontier.depth() >= options.max_depth {
                tracing::warn!(
                    depth = frontier.depth(),
                    pending = frontier.len(),
                    "traversal depth cap reached, abandoning deeper directories"
                );
                break;
            }

            let degree = level_parallelism(threads, frontier.depth());
            let children: Vec<PathBuf> = if degree <= 1 || frontier.len() <= 1 {
                frontier
                    .dirs()
                    .iter()
                    .flat_map(|dir| self.list_subdirs(dir, &options.ignore, cancel))
                    .collect()
            } else {
                let chunk = frontier.len().div_ceil(degree);
                pool.install(|| {
                    frontier
                        .dirs()
                        .par_chunks(chunk)
                        .flat_map_iter(|dirs| {
                            let mut out = Vec::new();
                            for dir in dirs {
                                if cancel.is_cancelled() {
                                    break;
                                }
                                out.extend(self.list_subdirs(dir, &options.ignore, cancel));
                            }
                            out
                        })
                        .collect()
                })
            };

            let mut next = Vec::with_capacity(children.len());
            for child in children {
                if seen.insert(child.clone()) {
                    visited.push(child.clone());
                    next.push(child);
                }
            }
            frontier.advance(next);
        }

        visited
    }

    /// Phase 2: list files of every visited directory, in fixed-size chunks.
    fn emit_files<F>(
        &self,
        pool: &rayon::ThreadPool,
        visited: &[PathBuf],
        cancel: &CancelFlag,
        emit: &F,
    ) where
        F: Fn(FileRecord) + Send + Sync,
    {
        for chunk in visited.chunks(EMIT_CHUNK_DIRS) {
            if cancel.is_cancelled() {
                break;
            }
            pool.install(|| {
                chunk.par_iter().for_each(|dir| {
                    if !cancel.is_cancelled() {
                        self.emit_dir_files(dir, cancel, emit);
                    }
                });
            });
            // Let the allocator settle between chunks on very large trees.
            std::thread::yield_now();
        }
    }

    /// List immediate subdirectories of `dir`, applying the ignore predicate.
    ///
    /// An unreadable directory is treated as having no children: the failure
    /// is counted and the walk continues. Directory symlinks are followed,
    /// which is exactly why the depth cap exists.
    fn list_subdirs(&self, dir: &Path, ignore: &IgnoreSet, cancel: &CancelFlag) -> Vec<PathBuf> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                self.stats.record_error();
                tracing::debug!(path = %dir.display(), error = %err, "skipping unreadable directory");
                return Vec::new();
            }
        };
        self.stats.record_dir();

        let mut out = Vec::new();
        for entry in entries {
            if cancel.is_cancelled() {
                break;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.stats.record_error();
                    tracing::debug!(path = %dir.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            let is_dir = match entry.file_type() {
                Ok(ft) if ft.is_symlink() => fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false),
                Ok(ft) => ft.is_dir(),
                Err(err) => {
                    self.stats.record_error();
                    tracing::debug!(path = %path.display(), error = %err, "skipping unstattable entry");
                    continue;
                }
            };
            if !is_dir {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if ignore.contains(name) {
                    continue;
                }
            }
            out.push(path);
        }
        out
    }

    /// Emit a record for every regular file directly inside `dir`.
    fn emit_dir_files<F>(&self, dir: &Path, cancel: &CancelFlag, emit: &F)
    where
        F: Fn(FileRecord) + Send + Sync,
    {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                self.stats.record_error();
                tracing::debug!(path = %dir.display(), error = %err, "skipping unreadable directory");
                return;
            }
        };

        for entry in entries {
            if cancel.is_cancelled() {
                break;
            }
            let Ok(entry) = entry else {
                self.stats.record_error();
                continue;
            };
            let path = entry.path();
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(err) => {
                    self.stats.record_error();
                    tracing::debug!(path = %path.display(), error = %err, "skipping unstattable file");
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }
            let Ok(modified) = meta.modified() else {
                self.stats.record_error();
                continue;
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let record = FileRecord {
                name,
                path: path.to_string_lossy().into_owned(),
                size: meta.len(),
                modified_at: modified.into(),
            };
            self.stats.record_file(record.size);
            emit(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().expect("temp dir");
        let root = temp.path();

        fs::create_dir(root.join("dir1")).expect("mkdir");
        fs::create_dir(root.join("dir2")).expect("mkdir");
        fs::create_dir(root.join("dir1/subdir")).expect("mkdir");

        fs::write(root.join("file1.txt"), "hello").expect("write");
        fs::write(root.join("dir1/file2.txt"), "world world world").expect("write");
        fs::write(root.join("dir1/subdir/file3.txt"), "test").expect("write");
        fs::write(root.join("dir2/file4.txt"), "another file here").expect("write");

        temp
    }

    fn collect_scan(root: &Path, options: &ScanOptions) -> (ScanStatus, Vec<FileRecord>) {
        let scanner = DirectoryScanner::new();
        let records = Mutex::new(Vec::new());
        let status = scanner
            .start_scan(root, options, &CancelFlag::new(), |record| {
                records.lock().expect("records lock").push(record);
            })
            .expect("scan");
        (status, records.into_inner().expect("records"))
    }

    #[test]
    fn discovers_every_file_exactly_once() {
        let temp = create_test_tree();
        let (status, records) = collect_scan(temp.path(), &ScanOptions::default());

        assert_eq!(status, ScanStatus::Completed);
        assert_eq!(records.len(), 4);

        let mut paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 4, "no duplicate discovery events");
    }

    #[test]
    fn records_carry_size_and_name() {
        let temp = create_test_tree();
        let (_, records) = collect_scan(temp.path(), &ScanOptions::default());

        let file1 = records.iter().find(|r| r.name == "file1.txt").expect("file1");
        assert_eq!(file1.size, 5);
        assert!(file1.path.ends_with("file1.txt"));
    }

    #[test]
    fn ignored_directories_are_pruned_case_insensitively() {
        let temp = create_test_tree();
        let options = ScanOptions {
            ignore: IgnoreSet::from_names(["DIR1"]),
            ..ScanOptions::default()
        };
        let (_, records) = collect_scan(temp.path(), &options);

        assert_eq!(records.len(), 2, "dir1 subtree pruned: {records:?}");
        assert!(records.iter().all(|r| !r.path.contains("dir1")));
    }

    #[test]
    fn depth_cap_bounds_traversal() {
        let temp = TempDir::new().expect("temp dir");
        let mut dir = temp.path().to_path_buf();
        // One file per level, six levels deep.
        fs::write(dir.join("level0.txt"), "x").expect("write");
        for level in 1..=6 {
            dir = dir.join(format!("d{level}"));
            fs::create_dir(&dir).expect("mkdir");
            fs::write(dir.join(format!("level{level}.txt")), "x").expect("write");
        }

        let options = ScanOptions {
            max_depth: 3,
            ..ScanOptions::default()
        };
        let (status, records) = collect_scan(temp.path(), &options);

        // Levels 0..=3 are visited; the cap abandons d4 and deeper.
        assert_eq!(status, ScanStatus::Completed);
        assert_eq!(records.len(), 4, "got: {records:?}");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_terminates_at_depth_cap() {
        let temp = TempDir::new().expect("temp dir");
        let root = temp.path();
        fs::create_dir(root.join("a")).expect("mkdir");
        fs::write(root.join("a/file.txt"), "x").expect("write");
        std::os::unix::fs::symlink(root.join("a"), root.join("a/loop")).expect("symlink");

        let options = ScanOptions {
            max_depth: 8,
            ..ScanOptions::default()
        };
        let (status, records) = collect_scan(root, &options);

        assert_eq!(status, ScanStatus::Completed);
        assert!(!records.is_empty());
    }

    #[test]
    fn second_scan_while_scanning_is_rejected() {
        let temp = create_test_tree();
        let scanner = DirectoryScanner::new();
        let rejections = AtomicU64::new(0);

        // Re-enter from the emit callback, while the first run is in flight.
        let status = scanner
            .start_scan(
                temp.path(),
                &ScanOptions::default(),
                &CancelFlag::new(),
                |_record| {
                    let err = scanner
                        .start_scan(temp.path(), &ScanOptions::default(), &CancelFlag::new(), |_| {})
                        .expect_err("must reject concurrent scan");
                    assert!(matches!(err, ScanError::AlreadyScanning));
                    rejections.fetch_add(1, Ordering::Relaxed);
                },
            )
            .expect("outer scan");

        assert_eq!(status, ScanStatus::Completed);
        assert!(rejections.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn cancellation_stops_discovery_early() {
        let temp = TempDir::new().expect("temp dir");
        let root = temp.path();
        for d in 0..20 {
            let dir = root.join(format!("dir{d}"));
            fs::create_dir(&dir).expect("mkdir");
            for f in 0..20 {
                fs::write(dir.join(format!("f{f}.txt")), "x").expect("write");
            }
        }

        let scanner = DirectoryScanner::new();
        let cancel = CancelFlag::new();
        let emitted = AtomicU64::new(0);
        let status = scanner
            .start_scan(root, &ScanOptions::default(), &cancel, |_record| {
                if emitted.fetch_add(1, Ordering::SeqCst) >= 5 {
                    cancel.cancel();
                }
            })
            .expect("scan");

        assert_eq!(status, ScanStatus::Cancelled);
        assert_eq!(scanner.status(), ScanStatus::Cancelled);
        let discovered = emitted.load(Ordering::SeqCst);
        assert!(discovered < 400, "cancelled scan must not see the whole tree");
    }

    #[test]
    fn rerun_resets_counters_instead_of_accumulating() {
        let temp = create_test_tree();
        let scanner = DirectoryScanner::new();
        for _ in 0..2 {
            scanner
                .start_scan(temp.path(), &ScanOptions::default(), &CancelFlag::new(), |_| {})
                .expect("scan");
        }

        let snap = scanner.stats().snapshot();
        assert_eq!(snap.files_discovered, 4, "second run must not stack onto the first");
        assert_eq!(snap.dirs_visited, 4);
    }

    #[test]
    fn missing_root_fails_the_run() {
        let scanner = DirectoryScanner::new();
        let err = scanner
            .start_scan(
                Path::new("/definitely/not/a/real/root"),
                &ScanOptions::default(),
                &CancelFlag::new(),
                |_| {},
            )
            .expect_err("must fail");
        assert!(matches!(err, ScanError::Root { .. }));
        assert_eq!(scanner.status(), ScanStatus::Failed);
    }
}
