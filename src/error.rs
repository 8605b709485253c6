//! Error taxonomy for the thumbnail pipeline.
//!
//! Per-photo failures (`Decode`, `StorageWrite`) are collected into
//! batch reports and never abort sibling photos. `JobState` and
//! `StaleVersion` guard the job state machine and the rotation
//! versioning protocol respectively.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unsupported or corrupt source image. Per-photo.
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Artifact could not be written to the cache directory. Per-photo,
    /// retryable by re-running regeneration.
    #[error("failed to write artifact {path}: {source}")]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Missing photo or artifact.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Illegal job state transition (e.g. cancelling a completed job).
    #[error("job {job_id}: {reason}")]
    JobState { job_id: i64, reason: String },

    /// Rotation edit outside the 0/90/180/270 domain; rejected before
    /// any state mutation.
    #[error("invalid rotation {0}, expected one of 0, 90, 180, 270")]
    InvalidRotation(i32),

    /// The photo's rotation version advanced between dispatch and
    /// finalize. The stale write is discarded, never merged.
    #[error("photo {photo_id}: rotation version moved from {expected} to {actual}")]
    StaleVersion {
        photo_id: i64,
        expected: i64,
        actual: i64,
    },

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is scoped to a single photo (and therefore
    /// must not fail the surrounding batch).
    pub fn is_per_photo(&self) -> bool {
        matches!(
            self,
            Error::Decode { .. } | Error::StorageWrite { .. } | Error::StaleVersion { .. }
        )
    }
}
