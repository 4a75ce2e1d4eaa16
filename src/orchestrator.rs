//! Turns requirement notifications into persisted jobs and keeps their
//! status in step with the processes behind them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, warn};

use crate::error::PaketError;
use crate::job::{Job, JobId, JobStatus, JobType};
use crate::package_manager::PackageManager;
use crate::process::{ExitOutcome, Process, ProcessHandle, exit_status};
use crate::repository::JobRepository;
use crate::requirement::{Requirement, RequirementEvent};

/// How often [`JobOrchestrator::listen`] settles jobs whose processes have
/// exited.
const REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Creates jobs, starts their commands and refreshes their status on read.
///
/// Never waits for a command to finish: status is re-derived whenever a job
/// is read back.
pub struct JobOrchestrator<R> {
    repository: R,
    package_manager: PackageManager,
    /// Directory for per-job output logs; output is discarded when unset.
    output_dir: Option<PathBuf>,
    /// Directory for per-job exit status files. Without it, an exit code is
    /// only observable by the orchestrator that spawned the process.
    exit_status_dir: Option<PathBuf>,
    /// Handles of processes spawned by this orchestrator, by job id.
    live: DashMap<String, ProcessHandle>,
}

impl<R: JobRepository> JobOrchestrator<R> {
    pub fn new(repository: R, package_manager: PackageManager) -> Self {
        Self {
            repository,
            package_manager,
            output_dir: None,
            exit_status_dir: None,
            live: DashMap::new(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_exit_status_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.exit_status_dir = Some(dir.into());
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn package_manager(&self) -> &PackageManager {
        &self.package_manager
    }

    pub async fn submit_install(&self, requirement: Requirement) -> Result<JobId, PaketError> {
        self.submit(JobType::Install, requirement).await
    }

    pub async fn submit_uninstall(&self, requirement: Requirement) -> Result<JobId, PaketError> {
        self.submit(JobType::Uninstall, requirement).await
    }

    pub async fn handle(&self, event: RequirementEvent) -> Result<JobId, PaketError> {
        let job_type = event.job_type();
        self.submit(job_type, event.into_requirement()).await
    }

    /// Creates the job, persists it as `Waiting`, starts the command and
    /// persists the result. A command that cannot be launched leaves the
    /// job `Failed`; that is still a successful submission.
    async fn submit(&self, job_type: JobType, requirement: Requirement) -> Result<JobId, PaketError> {
        let command = match job_type {
            JobType::Install => self.package_manager.install_command(&requirement),
            JobType::Uninstall => self.package_manager.uninstall_command(&requirement),
        };
        let mut job = Job::for_requirement(job_type, requirement);
        self.repository.save(&job).await?;
        info!(job_id = %job.id(), %job_type, command = %command, "job created");

        let output = job_file(self.output_dir.as_deref(), job.id(), "log").await;
        let status_file = job_file(self.exit_status_dir.as_deref(), job.id(), "exit").await;
        match Process::start(&command, output.as_deref(), status_file.as_deref()) {
            Ok(process) => {
                let handle = process.handle().cloned();
                job.mark_running(process)?;
                if let Some(handle) = handle {
                    self.live.insert(job.id().to_string(), handle);
                }
                info!(job_id = %job.id(), pid = ?job.process().pid(), "job running");
            }
            Err(err) => {
                warn!(job_id = %job.id(), error = %err, "job failed to start");
                job.mark_spawn_failed(Process::failed_to_start(&command, &err))?;
            }
        }

        self.repository.save(&job).await?;
        Ok(job.id().clone())
    }

    /// Loads a job and brings its status up to date.
    pub async fn get_job(&self, id: &str) -> Result<Job, PaketError> {
        let mut job = self.repository.find_by_id(id).await?;
        self.refresh(&mut job).await?;
        Ok(job)
    }

    /// Every job, each brought up to date.
    pub async fn list_jobs(&self) -> Result<Vec<Job>, PaketError> {
        let mut jobs = self.repository.find_all().await?;
        for job in &mut jobs {
            self.refresh(job).await?;
        }
        Ok(jobs)
    }

    /// Removes a job record and its exit status. Running processes are left
    /// alone.
    pub async fn forget(&self, id: &str) -> Result<(), PaketError> {
        self.live.remove(id);
        self.repository.delete(id).await?;
        if let (Some(dir), Ok(id)) = (&self.exit_status_dir, JobId::parse(id)) {
            let path = dir.join(format!("{id}.exit"));
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "cannot remove exit status");
                }
            }
        }
        Ok(())
    }

    /// Re-checks a running job's process and persists any transition.
    ///
    /// The outcome comes from the live handle when this orchestrator spawned
    /// the process, else from its exit status file. Only when neither exists
    /// (a process started without a status file, or a wrapper that was
    /// killed) does the job fail with an unknown outcome.
    ///
    /// The write is conditional: if another invocation settled the job in
    /// the meantime, its record wins and is returned instead.
    async fn refresh(&self, job: &mut Job) -> Result<(), PaketError> {
        if job.status() != JobStatus::Running {
            self.live.remove(job.id().as_str());
            return Ok(());
        }
        if job.process().handle().is_none() {
            if let Some(handle) = self.live.get(job.id().as_str()).map(|h| h.value().clone()) {
                job.attach_handle(handle);
            }
        }
        if job.process().is_alive() {
            debug!(job_id = %job.id(), "job still running");
            return Ok(());
        }

        let recorded = match job.process().handle() {
            Some(_) => None,
            None => self.recorded_exit(job.id()).await,
        };
        let outcome = recorded
            .or_else(|| job.process().exit_outcome())
            .unwrap_or_else(|| ExitOutcome::unknown("process state could not be determined"));
        let status = job.complete(outcome.clone())?;
        self.live.remove(job.id().as_str());

        if !self.repository.save_transition(job, JobStatus::Running).await? {
            debug!(job_id = %job.id(), "job settled elsewhere; reloading");
            *job = self.repository.find_by_id(job.id().as_str()).await?;
            return Ok(());
        }

        match status {
            JobStatus::Finished => info!(job_id = %job.id(), "job finished"),
            _ => warn!(job_id = %job.id(), %outcome, "job failed"),
        }
        Ok(())
    }

    async fn recorded_exit(&self, id: &JobId) -> Option<ExitOutcome> {
        let path = self.exit_status_dir.as_ref()?.join(format!("{id}.exit"));
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let outcome = exit_status::parse(&contents);
                if outcome.is_none() {
                    warn!(path = %path.display(), "unreadable exit status ignored");
                }
                outcome
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read exit status");
                None
            }
        }
    }

    /// Settles every job whose process, spawned here, has exited. Returns
    /// how many jobs reached a terminal status.
    pub async fn reap_exited(&self) -> usize {
        let exited: Vec<String> = self
            .live
            .iter()
            .filter(|entry| !matches!(entry.value().try_status(), Ok(None)))
            .map(|entry| entry.key().clone())
            .collect();

        let mut settled = 0;
        for id in exited {
            match self.get_job(&id).await {
                Ok(job) if job.is_finished() => settled += 1,
                Ok(_) => {}
                Err(e) => {
                    self.live.remove(&id);
                    warn!(job_id = %id, error = %e, "cannot settle exited job");
                }
            }
        }
        settled
    }

    /// Polls until the job reaches a terminal status or `timeout` elapses,
    /// returning the last snapshot either way.
    pub async fn wait_for(
        &self,
        id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Job, PaketError> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.get_job(id).await?;
            if job.is_finished() || Instant::now() >= deadline {
                return Ok(job);
            }
            sleep(poll_interval).await;
        }
    }

    /// Consumes requirement events until every emitter is dropped, settling
    /// exited jobs along the way.
    ///
    /// A failing event is logged and skipped; the rest keep flowing.
    /// Returns the number of jobs created.
    pub async fn listen(&self, mut events: mpsc::UnboundedReceiver<RequirementEvent>) -> usize {
        let mut created = 0;
        let mut reap = interval(REAP_INTERVAL);
        reap.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let requirement = event.requirement().to_string();
                    match self.handle(event).await {
                        Ok(id) => {
                            created += 1;
                            debug!(job_id = %id, %requirement, "requirement event handled");
                        }
                        Err(e) => error!(%requirement, error = %e, "requirement event dropped"),
                    }
                }
                _ = reap.tick() => {
                    self.reap_exited().await;
                }
            }
        }
        self.reap_exited().await;
        created
    }
}

/// `<dir>/<id>.<extension>`, creating `dir` first. `None` when no directory
/// is configured or it cannot be created.
async fn job_file(dir: Option<&Path>, id: &JobId, extension: &str) -> Option<PathBuf> {
    let dir = dir?;
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %e, "cannot create job directory; skipping {extension} file");
        return None;
    }
    Some(dir.join(format!("{id}.{extension}")))
}
