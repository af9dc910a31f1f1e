use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, MoveError>;

#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("failed to walk {path}")]
    Traversal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to transfer {source_path} to {destination}")]
    Transfer {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CRC check failed for: {source_path} and {destination}")]
    IntegrityMismatch {
        source_path: PathBuf,
        destination: PathBuf,
    },

    #[error("failed to remove source {path} after verification")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("move cancelled after an earlier failure")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl MoveError {
    pub(crate) fn traversal(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Traversal {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
