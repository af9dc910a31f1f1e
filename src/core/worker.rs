//! Per-file move pipeline and the bounded pool that runs it.
//!
//! Each job is transferred, verified, and only then removed from the source.
//! The pool serves a fixed-size queue with a fixed number of tasks; the first
//! failure cancels the shared token so the rest of the run winds down.

use std::fs;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::integrity::verify_transfer;
use crate::core::models::{MoveJob, ProgressEvent};
use crate::core::transfer::{TransferOptions, transfer_file};
use crate::error::{MoveError, Result};

/// Move one file: transfer, verify, then delete the source.
pub fn move_file(
    job: &MoveJob,
    options: TransferOptions,
    events: &mpsc::UnboundedSender<ProgressEvent>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let bytes = transfer_file(
        &job.source,
        &job.destination,
        job.mode,
        options,
        events,
        cancel,
    )?;

    complete_move(job)?;
    debug!(
        source = %job.source.display(),
        destination = %job.destination.display(),
        bytes,
        "Moved file"
    );

    Ok(bytes)
}

/// Second half of a move: the source is removed only if the copy matches it.
pub fn complete_move(job: &MoveJob) -> Result<()> {
    verify_transfer(&job.source, &job.destination)?;

    fs::remove_file(&job.source).map_err(|e| MoveError::Cleanup {
        path: job.source.clone(),
        source: e,
    })
}

/// Outcome of a finished pool.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    pub files_moved: u64,
    /// First real failure; `Cancelled` only when nothing else went wrong.
    pub error: Option<MoveError>,
}

/// Fixed number of worker tasks serving a bounded job queue.
pub struct WorkerPool {
    tasks: JoinSet<Result<u64>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Start `workers` tasks. Returns the pool and the queue's sending half.
    ///
    /// The queue closes once every sender is dropped, or once every worker
    /// has exited after cancellation.
    pub fn start(
        workers: usize,
        queue_depth: usize,
        options: TransferOptions,
        events: mpsc::UnboundedSender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Sender<MoveJob>) {
        let (job_tx, job_rx) = mpsc::channel::<MoveJob>(queue_depth.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut tasks = JoinSet::new();

        for id in 0..workers.max(1) {
            let job_rx = Arc::clone(&job_rx);
            let events = events.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let mut moved: u64 = 0;

                loop {
                    let job = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        job = async { job_rx.lock().await.recv().await } => job,
                    };
                    let Some(job) = job else { break };

                    let result = tokio::task::spawn_blocking({
                        let events = events.clone();
                        let cancel = cancel.clone();
                        move || {
                            let outcome = move_file(&job, options, &events, &cancel);
                            (job, outcome)
                        }
                    })
                    .await;

                    match result {
                        Ok((_, Ok(_))) => moved += 1,
                        Ok((job, Err(e))) => {
                            if !e.is_cancelled() {
                                warn!(
                                    worker = id,
                                    source = %job.source.display(),
                                    destination = %job.destination.display(),
                                    error = %e,
                                    "Move failed, leaving destination in place"
                                );
                            }
                            cancel.cancel();
                            return Err(e);
                        }
                        Err(e) => {
                            cancel.cancel();
                            return Err(MoveError::Worker(e.to_string()));
                        }
                    }
                }

                debug!(worker = id, files = moved, "Worker finished");
                Ok(moved)
            });
        }

        (Self { tasks, cancel }, job_tx)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for every worker to settle.
    pub async fn join(mut self) -> PoolOutcome {
        let mut outcome = PoolOutcome::default();

        while let Some(joined) = self.tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(MoveError::Worker(e.to_string())));

            match result {
                Ok(moved) => outcome.files_moved += moved,
                Err(e) => {
                    let replace = match &outcome.error {
                        None => true,
                        Some(existing) => existing.is_cancelled() && !e.is_cancelled(),
                    };
                    if replace {
                        outcome.error = Some(e);
                    }
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn job(dir: &Path, name: &str, content: &[u8]) -> MoveJob {
        let source = dir.join("src").join(name);
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::create_dir_all(dir.join("dst")).unwrap();
        fs::write(&source, content).unwrap();
        MoveJob {
            source,
            destination: dir.join("dst").join(name),
            mode: 0o644,
            size: content.len() as u64,
        }
    }

    #[test]
    fn move_file_removes_source_after_verification() {
        let temp = tempdir().unwrap();
        let job = job(temp.path(), "a.txt", b"hello");
        let (tx, _rx) = mpsc::unbounded_channel();

        let bytes =
            move_file(&job, TransferOptions::default(), &tx, &CancellationToken::new()).unwrap();

        assert_eq!(bytes, 5);
        assert!(!job.source.exists());
        assert_eq!(fs::read(&job.destination).unwrap(), b"hello");
    }

    #[test]
    fn transfer_failure_keeps_source() {
        let temp = tempdir().unwrap();
        let mut job = job(temp.path(), "a.txt", b"hello");
        job.destination = temp.path().join("no-such-dir").join("a.txt");
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = move_file(&job, TransferOptions::default(), &tx, &CancellationToken::new())
            .unwrap_err();

        assert!(matches!(err, MoveError::Transfer { .. }));
        assert!(job.source.exists());
    }

    #[test]
    fn corrupted_copy_keeps_source() {
        let temp = tempdir().unwrap();
        let job = job(temp.path(), "a.txt", b"hello world");
        let (tx, _rx) = mpsc::unbounded_channel();

        transfer_file(
            &job.source,
            &job.destination,
            job.mode,
            TransferOptions::default(),
            &tx,
            &CancellationToken::new(),
        )
        .unwrap();
        fs::OpenOptions::new()
            .write(true)
            .open(&job.destination)
            .unwrap()
            .set_len(3)
            .unwrap();

        let err = complete_move(&job).unwrap_err();

        assert!(matches!(err, MoveError::IntegrityMismatch { .. }));
        assert!(job.source.exists());
        assert_eq!(fs::read(&job.destination).unwrap(), b"hel");
    }

    #[tokio::test]
    async fn pool_moves_every_queued_job() {
        let temp = tempdir().unwrap();
        let jobs: Vec<MoveJob> = (0..10)
            .map(|i| job(temp.path(), &format!("f{i}.txt"), format!("file {i}").as_bytes()))
            .collect();

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (pool, queue) = WorkerPool::start(
            3,
            2,
            TransferOptions::default(),
            events_tx,
            CancellationToken::new(),
        );

        for job in jobs.clone() {
            queue.send(job).await.unwrap();
        }
        drop(queue);

        let outcome = pool.join().await;
        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        assert_eq!(outcome.files_moved, 10);

        let mut completed = 0;
        while let Some(event) = events_rx.recv().await {
            if event == ProgressEvent::FileTransferred {
                completed += 1;
            }
        }
        assert_eq!(completed, 10);

        for job in &jobs {
            assert!(!job.source.exists());
            assert!(job.destination.exists());
        }
    }

    #[tokio::test]
    async fn pool_failure_cancels_and_closes_queue() {
        let temp = tempdir().unwrap();
        let mut bad = job(temp.path(), "bad.txt", b"bad");
        bad.destination = temp.path().join("missing-dir").join("bad.txt");

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (pool, queue) = WorkerPool::start(
            1,
            1,
            TransferOptions::default(),
            events_tx,
            CancellationToken::new(),
        );
        let cancel = pool.cancel_token().clone();

        queue.send(bad.clone()).await.unwrap();
        cancel.cancelled().await;

        let outcome = pool.join().await;
        assert!(matches!(outcome.error, Some(MoveError::Transfer { .. })));
        assert!(bad.source.exists());

        // With every worker gone, the queue refuses new work.
        let late = job(temp.path(), "late.txt", b"late");
        assert!(queue.send(late).await.is_err());
    }

    #[tokio::test]
    async fn cancelled_pool_takes_no_queued_job() {
        let temp = tempdir().unwrap();
        let queued = job(temp.path(), "a.txt", b"queued");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (pool, queue) =
            WorkerPool::start(2, 4, TransferOptions::default(), events_tx, cancel);

        // Racing the workers' exit: either accepted and ignored, or refused.
        let _ = queue.try_send(queued.clone());
        drop(queue);

        let outcome = pool.join().await;
        assert_eq!(outcome.files_moved, 0);
        assert!(outcome.error.is_none());
        assert!(queued.source.exists());
        assert!(!queued.destination.exists());
    }
}
