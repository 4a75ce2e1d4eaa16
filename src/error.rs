//! Error types for job tracking.
//!
//! [`PaketError`] is what the library surfaces to callers. Storage failures
//! are described by [`RepositoryError`], which keeps "record is missing"
//! apart from "record is broken" so that the two are never handled the same
//! way.

use std::path::PathBuf;

use thiserror::Error;

use crate::job::JobStatus;
use crate::process::SpawnError;

#[derive(Debug, Error)]
pub enum PaketError {
    #[error("Malformed job record: {0}")]
    MalformedJobRecord(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    #[error("Requirement event channel is closed")]
    ChannelClosed,

    #[error("Config error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<RepositoryError> for PaketError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => PaketError::JobNotFound(id),
            other => PaketError::Repository(other),
        }
    }
}

/// Failures of the durable job store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No record exists for the id. Routine, not a fault.
    #[error("no job record for id {0}")]
    NotFound(String),

    /// The storage medium failed (disk full, permission denied, ...).
    #[error("storage fault at {}: {source}", path.display())]
    StorageFault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record exists but cannot be decoded. Needs manual inspection.
    #[error("corrupt job record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
}

impl RepositoryError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RepositoryError::StorageFault {
            path: path.into(),
            source,
        }
    }

    /// Only storage faults are worth retrying; corruption never is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::StorageFault { .. })
    }
}
