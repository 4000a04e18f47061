// error.rs — Error types for the file-backed tracking store.

use std::path::PathBuf;

use lt_byrole::TriggerError;
use thiserror::Error;

/// Errors that can occur while reading or writing tracking record files.
#[derive(Debug, Error)]
pub enum TrackingStoreError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A record file does not contain a valid tracking record.
    #[error("invalid tracking record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A record file holds a record for a different key than its name says.
    #[error("record at {path} belongs to {found}, expected {expected}")]
    KeyMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

impl TrackingStoreError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            TrackingStoreError::Io { path, .. }
            | TrackingStoreError::Corrupt { path, .. }
            | TrackingStoreError::KeyMismatch { path, .. } => path,
        }
    }
}

impl From<TrackingStoreError> for TriggerError {
    fn from(err: TrackingStoreError) -> Self {
        TriggerError::store(err.path().display(), err.to_string())
    }
}
