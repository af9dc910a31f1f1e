use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::config::MoveConfig;
use crate::core::models::{MoveReport, Progress};
use crate::core::progress::ProgressAggregator;
use crate::core::transfer::TransferOptions;
use crate::core::walker::{self, DispatchSummary};
use crate::core::worker::WorkerPool;
use crate::error::{MoveError, Result};

/// Runs one move from a source tree to a destination.
pub struct Mover {
    config: MoveConfig,
}

impl Mover {
    pub fn new(config: MoveConfig) -> Self {
        Self { config }
    }

    /// Move `source` to `destination`, rendering progress on stdout when enabled.
    pub async fn run(&self, source: &Path, destination: &Path) -> Result<MoveReport> {
        let out: Option<Box<dyn Write + Send>> = if self.config.show_progress {
            Some(Box::new(std::io::stdout()))
        } else {
            None
        };
        self.run_with_output(source, destination, out).await
    }

    /// Like `run`, with the progress line written to `out`.
    pub async fn run_with_output<W>(
        &self,
        source: &Path,
        destination: &Path,
        out: Option<W>,
    ) -> Result<MoveReport>
    where
        W: Write + Send + 'static,
    {
        let span = info_span!(
            "move",
            source = %source.display(),
            destination = %destination.display()
        );

        self.execute(source.to_path_buf(), destination.to_path_buf(), out)
            .instrument(span)
            .await
    }

    async fn execute<W>(
        &self,
        source: PathBuf,
        destination: PathBuf,
        out: Option<W>,
    ) -> Result<MoveReport>
    where
        W: Write + Send + 'static,
    {
        let start_time = Instant::now();
        check_paths(&source, &destination)?;

        // Pass 1: totals must be known before any progress is shown.
        let totals = {
            let source = source.clone();
            tokio::task::spawn_blocking(move || walker::precount(&source))
                .await
                .map_err(|e| MoveError::Worker(e.to_string()))??
        };
        info!(
            total_files = totals.files,
            total_bytes = totals.bytes,
            total_dirs = totals.directories,
            "Precount complete"
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let aggregator = ProgressAggregator::new(Progress::new(totals), out);
        let display = tokio::spawn(aggregator.run(events_rx));

        let cancel = CancellationToken::new();
        let (pool, queue) = WorkerPool::start(
            self.config.workers,
            self.config.effective_queue_depth(),
            TransferOptions {
                sync_file: self.config.sync_files,
            },
            events_tx,
            cancel.clone(),
        );

        // Pass 2: mirror directories and feed the pool. Dropping `queue` at
        // the end of the walk lets workers drain and exit.
        let walk = {
            let source = source.clone();
            let destination = destination.clone();
            tokio::task::spawn_blocking(move || {
                let mut created = Vec::new();
                let summary = walker::dispatch(&source, &destination, &queue, &mut created);
                (summary, created)
            })
        };

        let (walk_result, created_dirs) = match walk.await {
            Ok(done) => done,
            Err(e) => (Err(MoveError::Worker(e.to_string())), Vec::new()),
        };

        if let Err(e) = &walk_result {
            if !e.is_cancelled() {
                warn!(error = %e, "Walk aborted, letting queued moves finish");
            }
        }

        let outcome = pool.join().await;
        let progress = display
            .await
            .map_err(|e| MoveError::Worker(e.to_string()))?;

        let summary = select_result(walk_result, outcome.error)?;

        let directories_pruned = if self.config.prune_source_dirs {
            walker::prune_empty_dirs(&created_dirs)
        } else {
            0
        };

        let elapsed = start_time.elapsed();
        info!(
            files_moved = outcome.files_moved,
            bytes_moved = progress.bytes_moved,
            dirs_created = summary.directories_created,
            dirs_pruned = directories_pruned,
            skipped = summary.entries_skipped,
            duration_ms = elapsed.as_millis() as u64,
            "Move complete"
        );

        Ok(MoveReport {
            progress,
            directories_created: summary.directories_created,
            directories_pruned,
            elapsed,
        })
    }
}

/// Pick the error to report: a real worker failure explains a cancelled walk,
/// otherwise the walk's own error comes first.
fn select_result(
    walk: Result<DispatchSummary>,
    worker_error: Option<MoveError>,
) -> Result<DispatchSummary> {
    match (walk, worker_error) {
        (Ok(summary), None) => Ok(summary),
        (Err(walk_err), Some(worker_err)) if walk_err.is_cancelled() => Err(worker_err),
        (Err(walk_err), _) => Err(walk_err),
        (Ok(_), Some(worker_err)) => Err(worker_err),
    }
}

/// Reject moves the walk cannot perform safely.
fn check_paths(source: &Path, destination: &Path) -> Result<()> {
    let invalid = |path: &Path, reason: &str| MoveError::InvalidPath {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    // Links are never followed, so a linked root would move nothing.
    let root_type = source
        .symlink_metadata()
        .map_err(|e| MoveError::traversal(source, e))?
        .file_type();
    if !root_type.is_dir() && !root_type.is_file() {
        return Err(invalid(source, "source is not a regular file or directory"));
    }

    let source_abs = source
        .canonicalize()
        .map_err(|e| MoveError::traversal(source, e))?;

    // The destination does not exist yet; resolve through its parent.
    let destination_abs = match (destination.parent(), destination.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            match parent.canonicalize() {
                Ok(parent) => parent.join(name),
                // Missing parent: the walk reports it when creating the root.
                Err(_) => return Ok(()),
            }
        }
        _ => return Err(invalid(destination, "destination has no file name")),
    };

    if destination_abs == source_abs {
        return Err(invalid(destination, "destination is the source"));
    }
    if destination_abs.starts_with(&source_abs) {
        return Err(invalid(destination, "destination is inside the source tree"));
    }

    Ok(())
}
