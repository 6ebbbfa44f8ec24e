//! Scan command: the thin orchestrator wiring scanner → queue → writer.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::utils::parse_csv;
use crate::config::{load_settings, merge_cli_with_settings, CliOverrides};
use crate::domain::{CancelFlag, IgnoreSet, ScanStatus};
use crate::ingest::IngestQueue;
use crate::scan::{DirectoryScanner, ScanOptions};
use crate::store::BatchWriter;

#[derive(Args)]
pub struct ScanArgs {
    /// Root directory to index
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// SQLite path for the catalog
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Path to config file (filedex.toml or .filedex.yml)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Scan worker threads (0 = one per core)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Records committed per writer transaction
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Bound the ingest queue; producers block when full. Unbounded if omitted
    #[arg(long, value_name = "N")]
    pub queue_capacity: Option<usize>,

    /// Traversal depth cap
    #[arg(long, value_name = "DEPTH")]
    pub max_depth: Option<u32>,

    /// Directory names to skip (comma-separated, case-insensitive)
    #[arg(long, value_name = "NAMES")]
    pub ignore: Option<String>,
}

pub fn run(args: ScanArgs) -> Result<()> {
    if !args.root.is_dir() {
        anyhow::bail!("Scan root is not a directory: {}", args.root.display());
    }

    let settings = load_settings(&args.root, args.config.as_deref())?;
    let settings = merge_cli_with_settings(
        settings,
        CliOverrides {
            db: args.db.clone(),
            threads: args.threads,
            batch_size: args.batch_size,
            queue_capacity: args.queue_capacity,
            max_depth: args.max_depth,
            ignore: parse_csv(&args.ignore),
        },
    );

    let queue = Arc::new(IngestQueue::new(settings.queue_capacity));
    let writer = Arc::new(BatchWriter::new(Arc::clone(&queue), settings.batch_size));
    writer
        .initialize(&settings.db)
        .with_context(|| format!("Failed to open catalog at {}", settings.db.display()))?;
    writer.start().context("Failed to start the catalog writer")?;

    let scanner = DirectoryScanner::new();
    let options = ScanOptions {
        threads: settings.threads,
        max_depth: settings.max_depth,
        ignore: IgnoreSet::from_names(&settings.ignore),
    };
    let cancel = CancelFlag::new();

    let started = Instant::now();
    let progress = spawn_progress_monitor(&scanner, &queue);

    let scan_result = {
        let writer = Arc::clone(&writer);
        scanner.start_scan(&args.root, &options, &cancel, move |record| {
            if let Err(err) = writer.enqueue(record) {
                tracing::warn!(error = %err, "dropping discovered record");
            }
        })
    };

    progress.finish();
    // Drain and commit before reporting the scan outcome: a writer failure
    // matters even when the scan itself failed.
    let report = writer.stop().context("Catalog writer failed")?;
    let status = scan_result.context("Scan failed")?;

    let snap = scanner.stats().snapshot();
    let elapsed = started.elapsed().as_secs_f64();
    println!(
        "Indexed {} files ({} bytes) across {} directories in {elapsed:.2}s",
        snap.files_discovered, snap.bytes_discovered, snap.dirs_visited
    );
    println!("{} rows written to {}", report.records_written, settings.db.display());
    if snap.errors_ignored > 0 {
        println!("note: {} unreadable items were skipped", snap.errors_ignored);
    }
    if status == ScanStatus::Cancelled {
        println!("scan was cancelled; the catalog holds a partial index");
    }

    Ok(())
}

struct ProgressMonitor {
    done: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<()>,
    bar: ProgressBar,
}

impl ProgressMonitor {
    fn finish(self) {
        self.done.store(true, Ordering::SeqCst);
        let _ = self.handle.join();
        self.bar.finish_and_clear();
    }
}

/// Feed a spinner from the scan counters and queue depth. Display only; the
/// pipeline does not depend on it.
fn spawn_progress_monitor(scanner: &DirectoryScanner, queue: &Arc<IngestQueue>) -> ProgressMonitor {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    let done = Arc::new(AtomicBool::new(false));
    let handle = {
        let bar = bar.clone();
        let done = Arc::clone(&done);
        let stats = scanner.stats();
        let queue = Arc::clone(queue);
        std::thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                let snap = stats.snapshot();
                bar.set_message(format!(
                    "{} files discovered, {} queued",
                    snap.files_discovered,
                    queue.depth()
                ));
                bar.tick();
                std::thread::sleep(Duration::from_millis(100));
            }
        })
    };

    ProgressMonitor { done, handle, bar }
}
