use dashmap::DashMap;

use super::{JobRepository, decode, encode, is_record_key};
use crate::error::RepositoryError;
use crate::job::{Job, JobStatus};

/// In-process repository. Jobs are stored serialized so decoding behaves
/// exactly as it does on disk.
#[derive(Debug, Default)]
pub struct MemoryJobRepository {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stores raw bytes under `id`, bypassing encoding.
    pub fn insert_raw(&self, id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.records.insert(id.into(), bytes.into());
    }
}

impl JobRepository for MemoryJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        let bytes = encode(job)?;
        self.records.insert(job.id().to_string(), bytes);
        Ok(())
    }

    async fn save_transition(&self, job: &Job, expected: JobStatus) -> Result<bool, RepositoryError> {
        let id = job.id().as_str();
        let bytes = encode(job)?;
        // The entry guard keeps the check and the write together.
        let Some(mut entry) = self.records.get_mut(id) else {
            return Ok(false);
        };
        if decode(id, entry.value())?.status() != expected {
            return Ok(false);
        }
        *entry.value_mut() = bytes;
        Ok(true)
    }

    async fn find_by_id(&self, id: &str) -> Result<Job, RepositoryError> {
        if !is_record_key(id) {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        let bytes = self
            .records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        decode(id, &bytes)
    }

    async fn find_all(&self) -> Result<Vec<Job>, RepositoryError> {
        let snapshot: Vec<(String, Vec<u8>)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut jobs = Vec::with_capacity(snapshot.len());
        for (id, bytes) in snapshot {
            match decode(&id, &bytes) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::error!(job_id = %id, error = %e, "corrupt job record skipped"),
            }
        }
        Ok(jobs)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.records.remove(id);
        Ok(())
    }
}
