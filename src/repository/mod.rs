//! Durable job storage.
//!
//! The repository is a keyed bag of independent records: read-your-writes
//! per id, no ordering across ids. Handles are constructed explicitly and
//! passed to whoever needs them.

mod file;
mod memory;

pub use file::FileJobRepository;
pub use memory::MemoryJobRepository;

use std::future::Future;

use crate::error::RepositoryError;
use crate::job::{Job, JobStatus};

pub trait JobRepository: Send + Sync {
    /// Creates or overwrites the record for `job.id()`.
    fn save(&self, job: &Job) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Overwrites the record only while it is still stored with status
    /// `expected`. Returns whether the write happened. A missing record is
    /// never recreated.
    fn save_transition(
        &self,
        job: &Job,
        expected: JobStatus,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    fn find_by_id(&self, id: &str) -> impl Future<Output = Result<Job, RepositoryError>> + Send;

    /// Every decodable job, in no particular order.
    fn find_all(&self) -> impl Future<Output = Result<Vec<Job>, RepositoryError>> + Send;

    /// Removes a record. Deleting an absent record is not an error.
    fn delete(&self, id: &str) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Decodes a stored record, turning decode failures into corruption.
pub(crate) fn decode(id: &str, bytes: &[u8]) -> Result<Job, RepositoryError> {
    let job = Job::from_json(bytes).map_err(|e| RepositoryError::CorruptRecord {
        id: id.to_string(),
        reason: e.to_string(),
    })?;
    if job.id().as_str() != id {
        return Err(RepositoryError::CorruptRecord {
            id: id.to_string(),
            reason: format!("record is stored under {id} but carries id {}", job.id()),
        });
    }
    Ok(job)
}

pub(crate) fn encode(job: &Job) -> Result<Vec<u8>, RepositoryError> {
    job.to_json().map_err(|e| RepositoryError::CorruptRecord {
        id: job.id().to_string(),
        reason: e.to_string(),
    })
}

// Only canonical job ids name records; anything else cannot exist.
pub(crate) fn is_record_key(id: &str) -> bool {
    crate::job::JobId::parse(id).is_ok()
}
