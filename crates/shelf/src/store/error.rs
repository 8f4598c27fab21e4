//! Storage error types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the document and record stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with the given id exists in the collection.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// No snapshot with the given name exists in the backup directory.
    #[error("backup not found: {0}")]
    BackupNotFound(String),

    /// Filesystem operation failed.
    #[error("file io error at {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File exists but does not hold a well-formed collection.
    #[error("malformed document at {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Collection could not be serialized.
    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    /// The store queue did not admit the operation in time.
    #[error("store busy: not admitted within {0:?}")]
    Busy(Duration),
}

impl StoreError {
    pub fn file_io(path: &Path, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn malformed(path: &Path, source: serde_json::Error) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this error means the requested record or snapshot is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound(_) | Self::BackupNotFound(_))
    }
}
