use std::fs::Metadata;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

/// Point-in-time copy of the aggregate move counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub bytes_moved: u64,
    pub total_bytes: u64,
    pub files_moved: u64,
    pub total_files: u64,
}

impl Progress {
    pub fn new(totals: TreeTotals) -> Self {
        Self {
            total_bytes: totals.bytes,
            total_files: totals.files,
            ..Default::default()
        }
    }

    /// Fold one worker event into the counters.
    pub fn apply(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::BytesWritten(n) => self.bytes_moved += n,
            ProgressEvent::FileTransferred => self.files_moved += 1,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.files_moved == self.total_files && self.bytes_moved == self.total_bytes
    }
}

/// Delta sent by a worker; the aggregator owns the running totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    BytesWritten(u64),
    FileTransferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    /// Symlinks, sockets, devices: never moved
    Other,
}

/// A source path paired with the metadata the pipeline needs.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
}

impl TreeEntry {
    /// Build from `symlink_metadata`, so links are classified, not followed.
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        Self {
            path,
            kind,
            mode: metadata.permissions().mode() & 0o7777,
            size: metadata.len(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Totals from the precount pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeTotals {
    pub files: u64,
    pub bytes: u64,
    pub directories: u64,
}

/// One file handed to the worker pool.
#[derive(Debug, Clone)]
pub struct MoveJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: u32,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct MoveReport {
    pub progress: Progress,
    pub directories_created: u64,
    pub directories_pruned: u64,
    pub elapsed: Duration,
}
