pub mod integrity;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod transfer;
pub mod walker;
pub mod worker;

pub use integrity::{checksum_file, files_match, verify_transfer};
pub use models::{EntryKind, MoveJob, MoveReport, Progress, ProgressEvent, TreeEntry, TreeTotals};
pub use orchestrator::Mover;
pub use progress::{ProgressAggregator, progress_bar, status_line};
pub use worker::{WorkerPool, complete_move, move_file};
