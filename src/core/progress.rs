//! Progress aggregation for a running move.
//!
//! Workers send `ProgressEvent` deltas over an unbounded channel. The
//! aggregator is the only owner of the running `Progress`, folds each event
//! into it, and re-renders a single status line after every event.

use std::io::Write;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::models::{Progress, ProgressEvent};

/// Width of the textual bar, in characters.
pub const BAR_WIDTH: usize = 20;

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Render `current / total` as a `width`-character bar: `=` for the completed
/// part, a `>` cursor, then spaces. A complete bar has no cursor.
pub fn progress_bar(current: u64, total: u64, width: usize) -> String {
    let ratio = if total == 0 {
        1.0
    } else {
        (current as f64 / total as f64).clamp(0.0, 1.0)
    };
    let complete = ((ratio * width as f64).floor() as usize).min(width);

    let mut bar = "=".repeat(complete);
    if complete < width {
        bar.push('>');
        bar.push_str(&" ".repeat(width - complete - 1));
    }
    bar
}

/// The single status line for a snapshot, without the leading carriage return.
pub fn status_line(progress: &Progress) -> String {
    format!(
        "{} files - {:.1}GB [{}]",
        progress.files_moved,
        progress.bytes_moved as f64 / BYTES_PER_GB,
        progress_bar(progress.bytes_moved, progress.total_bytes, BAR_WIDTH)
    )
}

/// Spaces out the aggregator's debug trace; one event arrives per buffer write.
#[derive(Debug)]
struct TraceInterval {
    every: Duration,
    next_due: Option<Instant>,
}

impl TraceInterval {
    fn new(every: Duration) -> Self {
        Self {
            every,
            next_due: None,
        }
    }

    fn due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(next) if now < next => false,
            _ => {
                self.next_due = Some(now + self.every);
                true
            }
        }
    }
}

pub struct ProgressAggregator<W> {
    progress: Progress,
    out: Option<W>,
    trace: TraceInterval,
}

impl<W: Write> ProgressAggregator<W> {
    /// Aggregate from `initial`, rendering to `out` when one is given.
    pub fn new(initial: Progress, out: Option<W>) -> Self {
        Self {
            progress: initial,
            out,
            trace: TraceInterval::new(Duration::from_millis(500)),
        }
    }

    pub fn snapshot(&self) -> Progress {
        self.progress
    }

    /// Fold one event and re-render. Returns the new snapshot.
    pub fn apply(&mut self, event: ProgressEvent) -> Progress {
        self.progress.apply(event);

        if self.trace.due(Instant::now()) {
            debug!(
                files_moved = self.progress.files_moved,
                total_files = self.progress.total_files,
                bytes_moved = self.progress.bytes_moved,
                total_bytes = self.progress.total_bytes,
                "Move progress"
            );
        }

        self.render();
        self.progress
    }

    fn render(&mut self) {
        let Some(out) = self.out.as_mut() else {
            return;
        };

        let line = status_line(&self.progress);
        let written = write!(out, "\r{line}").and_then(|_| out.flush());
        if let Err(e) = written {
            warn!(error = %e, "Failed to render progress, disabling display");
            self.out = None;
        }
    }

    /// Consume events until every sender is gone. Returns the final snapshot.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ProgressEvent>) -> Progress {
        while let Some(event) = events.recv().await {
            self.apply(event);
        }

        debug!(
            files_moved = self.progress.files_moved,
            bytes_moved = self.progress.bytes_moved,
            "Progress stream closed"
        );

        self.progress
    }
}
