use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use super::{JobRepository, decode, encode, is_record_key};
use crate::error::RepositoryError;
use crate::job::{Job, JobStatus};

const RECORD_EXTENSION: &str = "json";

/// One JSON file per job under `<dir>/<id>.json`.
///
/// Writes go to a unique temp file that is then renamed over the record, so
/// readers only ever see complete records. Writes to the same id are
/// serialized twice over: by an async lock inside this process and by an OS
/// lock on `<dir>/.<id>.lock` across processes. Different ids do not
/// contend.
#[derive(Debug)]
pub struct FileJobRepository {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileJobRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!(".{id}.lock"))
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(id.to_string()).or_default().value().clone()
    }

    /// Blocks until this process holds the OS lock for `id`. Released when
    /// the returned file is dropped.
    async fn lock_file(&self, id: &str) -> Result<std::fs::File, RepositoryError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RepositoryError::storage(&self.dir, e))?;

        let path = self.lock_path(id);
        tokio::task::spawn_blocking(move || -> Result<std::fs::File, RepositoryError> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .map_err(|e| RepositoryError::storage(&path, e))?;
            file.lock().map_err(|e| RepositoryError::storage(&path, e))?;
            Ok(file)
        })
        .await
        .map_err(|e| RepositoryError::storage(&self.dir, io::Error::other(e)))?
    }

    async fn read_record(&self, id: &str) -> Result<Job, RepositoryError> {
        let path = self.record_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(id.to_string()));
            }
            Err(e) => return Err(RepositoryError::storage(path, e)),
        };
        decode(id, &bytes)
    }

    // Callers hold both locks for `id`.
    async fn write_record(&self, id: &str, bytes: &[u8]) -> Result<(), RepositoryError> {
        let target = self.record_path(id);
        let tmp = self.dir.join(format!(".{id}.{}.tmp", Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&tmp, bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(RepositoryError::storage(tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(RepositoryError::storage(target, e));
        }
        Ok(())
    }
}

impl JobRepository for FileJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        let id = job.id().as_str();
        let bytes = encode(job)?;

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let _file_lock = self.lock_file(id).await?;

        self.write_record(id, &bytes).await?;
        debug!(job_id = %id, status = %job.status(), "saved job record");
        Ok(())
    }

    async fn save_transition(&self, job: &Job, expected: JobStatus) -> Result<bool, RepositoryError> {
        let id = job.id().as_str();
        let bytes = encode(job)?;

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let _file_lock = self.lock_file(id).await?;

        let stored = match self.read_record(id).await {
            Ok(stored) => stored.status(),
            Err(RepositoryError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if stored != expected {
            debug!(job_id = %id, %stored, %expected, "job record moved on; write skipped");
            return Ok(false);
        }

        self.write_record(id, &bytes).await?;
        debug!(job_id = %id, status = %job.status(), "saved job transition");
        Ok(true)
    }

    async fn find_by_id(&self, id: &str) -> Result<Job, RepositoryError> {
        if !is_record_key(id) {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        self.read_record(id).await
    }

    async fn find_all(&self) -> Result<Vec<Job>, RepositoryError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RepositoryError::storage(&self.dir, e)),
        };

        let mut jobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepositoryError::storage(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !is_record_key(id) {
                continue;
            }

            match self.read_record(id).await {
                Ok(job) => jobs.push(job),
                // Deleted between listing and reading.
                Err(RepositoryError::NotFound(_)) => {}
                Err(RepositoryError::CorruptRecord { id, reason }) => {
                    error!(
                        job_id = %id,
                        path = %path.display(),
                        %reason,
                        "corrupt job record skipped; needs manual inspection"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(jobs)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        if !is_record_key(id) {
            return Ok(());
        }
        let lock = self.lock_for(id);
        let guard = lock.lock().await;
        let file_lock = self.lock_file(id).await?;

        let path = self.record_path(id);
        let removed = match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(RepositoryError::storage(path, e)),
        };

        let _ = fs::remove_file(self.lock_path(id)).await;
        drop(file_lock);
        drop(guard);
        self.locks.remove(id);

        if removed {
            debug!(job_id = %id, "deleted job record");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::job::JobType;
    use crate::process::{ExitOutcome, Process, ProcessRecord};
    use crate::requirement::Requirement;

    fn repo() -> (TempDir, FileJobRepository) {
        let tmp = TempDir::new().unwrap();
        let repo = FileJobRepository::new(tmp.path().join("jobs"));
        (tmp, repo)
    }

    fn widget_job() -> Job {
        Job::for_requirement(
            JobType::Install,
            Requirement::new("acme/widget", "^1.0").unwrap(),
        )
    }

    fn running(mut job: Job) -> Job {
        let process = Process::from_record(ProcessRecord {
            command_line: "composer require --no-interaction acme/widget:^1.0".into(),
            pid: Some(4242),
            alive: Some(true),
            started_at: Some(Utc::now()),
            ..Default::default()
        })
        .unwrap();
        job.mark_running(process).unwrap();
        job
    }

    #[tokio::test]
    async fn save_then_find_returns_same_job() {
        let (_tmp, repo) = repo();
        let job = widget_job();
        repo.save(&job).await.unwrap();

        let found = repo.find_by_id(job.id().as_str()).await.unwrap();
        assert_eq!(found, job);
    }

    #[tokio::test]
    async fn save_overwrites_existing_record() {
        let (_tmp, repo) = repo();
        let job = widget_job();
        repo.save(&job).await.unwrap();

        let job = running(job);
        repo.save(&job).await.unwrap();

        let found = repo.find_by_id(job.id().as_str()).await.unwrap();
        assert_eq!(found.status(), JobStatus::Running);
        assert_eq!(found, job);
    }

    #[tokio::test]
    async fn missing_id_is_not_found() {
        let (_tmp, repo) = repo();
        let unknown = uuid::Uuid::new_v4().to_string();
        for id in ["nonexistent-id", "../../etc/passwd", "", unknown.as_str()] {
            let err = repo.find_by_id(id).await.unwrap_err();
            assert!(matches!(err, RepositoryError::NotFound(_)), "{id}: {err}");
        }
    }

    #[tokio::test]
    async fn corrupt_record_is_not_reported_as_missing() {
        let (_tmp, repo) = repo();
        let job = widget_job();
        repo.save(&job).await.unwrap();
        std::fs::write(repo.record_path(job.id().as_str()), b"{\"type\": \"Inst").unwrap();

        let err = repo.find_by_id(job.id().as_str()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::CorruptRecord { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn find_all_skips_corrupt_records() {
        let (_tmp, repo) = repo();
        let good = widget_job();
        repo.save(&good).await.unwrap();

        let broken_id = uuid::Uuid::new_v4().to_string();
        std::fs::write(repo.record_path(&broken_id), b"not json at all").unwrap();

        let jobs = repo.find_all().await.unwrap();
        assert_eq!(jobs, vec![good]);
        // Never auto-deleted.
        assert!(repo.record_path(&broken_id).exists());
    }

    #[tokio::test]
    async fn record_under_wrong_name_is_corrupt() {
        let (_tmp, repo) = repo();
        let job = widget_job();
        repo.save(&job).await.unwrap();

        let other_id = uuid::Uuid::new_v4().to_string();
        std::fs::copy(
            repo.record_path(job.id().as_str()),
            repo.record_path(&other_id),
        )
        .unwrap();

        assert!(matches!(
            repo.find_by_id(&other_id).await,
            Err(RepositoryError::CorruptRecord { .. })
        ));
    }

    #[tokio::test]
    async fn find_all_on_missing_dir_is_empty() {
        let (_tmp, repo) = repo();
        assert!(repo.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_all_ignores_foreign_files() {
        let (_tmp, repo) = repo();
        let job = widget_job();
        repo.save(&job).await.unwrap();
        std::fs::write(repo.dir().join(format!("{}.log", job.id())), b"output").unwrap();
        std::fs::write(repo.dir().join("notes.json"), b"{}").unwrap();

        assert_eq!(repo.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_tmp, repo) = repo();
        let job = widget_job();
        repo.save(&job).await.unwrap();

        repo.delete(job.id().as_str()).await.unwrap();
        repo.delete(job.id().as_str()).await.unwrap();
        repo.delete("nonexistent-id").await.unwrap();
        assert!(matches!(
            repo.find_by_id(job.id().as_str()).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_drops_lock_state() {
        let (_tmp, repo) = repo();
        let job = widget_job();
        repo.save(&job).await.unwrap();
        assert!(repo.lock_path(job.id().as_str()).exists());
        assert_eq!(repo.locks.len(), 1);

        repo.delete(job.id().as_str()).await.unwrap();
        assert!(!repo.lock_path(job.id().as_str()).exists());
        assert!(repo.locks.is_empty());
    }

    fn finished(mut job: Job) -> Job {
        job.complete(ExitOutcome::Success).unwrap();
        job
    }

    #[tokio::test]
    async fn save_transition_writes_while_status_matches() {
        let (_tmp, repo) = repo();
        let job = running(widget_job());
        repo.save(&job).await.unwrap();

        let done = finished(job.clone());
        assert!(repo.save_transition(&done, JobStatus::Running).await.unwrap());
        assert_eq!(repo.find_by_id(job.id().as_str()).await.unwrap(), done);
    }

    #[tokio::test]
    async fn save_transition_never_overwrites_a_settled_job() {
        let (_tmp, repo) = repo();
        let job = running(widget_job());
        repo.save(&job).await.unwrap();
        let done = finished(job.clone());
        repo.save(&done).await.unwrap();

        // A reader still holding the Running snapshot decides it failed.
        let mut stale = job;
        stale.complete(ExitOutcome::unknown("process exited while unobserved")).unwrap();
        assert!(!repo.save_transition(&stale, JobStatus::Running).await.unwrap());

        let stored = repo.find_by_id(done.id().as_str()).await.unwrap();
        assert_eq!(stored.status(), JobStatus::Finished);
        assert_eq!(stored, done);
    }

    #[tokio::test]
    async fn save_transition_does_not_resurrect_deleted_job() {
        let (_tmp, repo) = repo();
        let job = running(widget_job());
        repo.save(&job).await.unwrap();
        repo.delete(job.id().as_str()).await.unwrap();

        let done = finished(job);
        assert!(!repo.save_transition(&done, JobStatus::Running).await.unwrap());
        assert!(matches!(
            repo.find_by_id(done.id().as_str()).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_saves_leave_complete_records() {
        let (_tmp, repo) = repo();
        let repo = Arc::new(repo);
        let job = widget_job();
        let running_job = running(job.clone());

        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = Arc::clone(&repo);
            let job = if i % 2 == 0 { job.clone() } else { running_job.clone() };
            handles.push(tokio::spawn(async move { repo.save(&job).await }));
        }
        for _ in 0..20 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move { repo.save(&widget_job()).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let found = repo.find_by_id(job.id().as_str()).await.unwrap();
        assert!(found == job || found == running_job);
        assert_eq!(repo.find_all().await.unwrap().len(), 21);

        let leftovers = std::fs::read_dir(repo.dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
