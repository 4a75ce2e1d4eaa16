use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::JobRecord;
use super::status::JobStatus;
use crate::error::PaketError;
use crate::process::{ExitOutcome, Process, ProcessHandle};
use crate::requirement::{Requirement, RequirementRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    Install,
    Uninstall,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Install => f.pad("install"),
            JobType::Uninstall => f.pad("uninstall"),
        }
    }
}

/// Globally unique job identifier (random UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts only canonical hyphenated UUIDs, so an id is always safe to
    /// use as a storage key.
    pub fn parse(raw: &str) -> Result<Self, PaketError> {
        let uuid = Uuid::parse_str(raw)
            .map_err(|e| PaketError::MalformedJobRecord(format!("invalid job id {raw:?}: {e}")))?;
        let canonical = uuid.hyphenated().to_string();
        if canonical != raw {
            return Err(PaketError::MalformedJobRecord(format!(
                "job id {raw:?} is not in canonical form"
            )));
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One install or uninstall attempt: its status, the process doing the
/// work and the requirement it acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    job_type: JobType,
    id: JobId,
    status: JobStatus,
    process: Process,
    requirement: Option<Requirement>,
}

impl Job {
    /// A fresh `Waiting` job with a new id, an empty process and no
    /// requirement. Nothing is persisted.
    pub fn of_type(job_type: JobType) -> Self {
        Self {
            job_type,
            id: JobId::generate(),
            status: JobStatus::Waiting,
            process: Process::empty(),
            requirement: None,
        }
    }

    pub fn for_requirement(job_type: JobType, requirement: Requirement) -> Self {
        Self::of_type(job_type).with_requirement(requirement)
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = Some(requirement);
        self
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn requirement(&self) -> Option<&Requirement> {
        self.requirement.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Installs the spawned process and moves to `Running`.
    pub fn mark_running(&mut self, process: Process) -> Result<(), PaketError> {
        self.ensure_transition(JobStatus::Running)?;
        if !process.is_started() {
            return Err(PaketError::IllegalTransition {
                from: self.status,
                to: JobStatus::Running,
            });
        }
        self.process = process;
        self.status = JobStatus::Running;
        Ok(())
    }

    /// Records a process that could not be launched and moves straight to
    /// `Failed`. The process must carry its failure outcome.
    pub fn mark_spawn_failed(&mut self, process: Process) -> Result<(), PaketError> {
        self.ensure_transition(JobStatus::Failed)?;
        if !process.recorded_outcome().is_some_and(|o| !o.is_success()) {
            return Err(PaketError::IllegalTransition {
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        self.process = process;
        self.status = JobStatus::Failed;
        Ok(())
    }

    /// Finishes a running job with the observed outcome.
    pub fn complete(&mut self, outcome: ExitOutcome) -> Result<JobStatus, PaketError> {
        let next = if outcome.is_success() {
            JobStatus::Finished
        } else {
            JobStatus::Failed
        };
        self.ensure_transition(next)?;
        self.process.record_outcome(outcome);
        self.status = next;
        Ok(next)
    }

    pub fn attach_handle(&mut self, handle: ProcessHandle) -> bool {
        self.process.attach(handle)
    }

    fn ensure_transition(&self, next: JobStatus) -> Result<(), PaketError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(PaketError::IllegalTransition {
                from: self.status,
                to: next,
            })
        }
    }

    pub fn to_record(&self) -> JobRecord {
        JobRecord {
            job_type: self.job_type,
            id: self.id.to_string(),
            status: self.status,
            process: self.process.to_record(),
            // Jobs without a requirement still carry an (empty) block.
            requirement: self
                .requirement
                .as_ref()
                .map(Requirement::to_record)
                .unwrap_or_else(RequirementRecord::default),
        }
    }

    pub fn from_record(record: JobRecord) -> Result<Self, PaketError> {
        let id = JobId::parse(&record.id)?;
        let process = Process::from_record(record.process)?;
        let requirement = Requirement::from_record(record.requirement)?;

        if let Some(problem) = inconsistency(record.status, &process) {
            return Err(PaketError::MalformedJobRecord(format!("job {id} {problem}")));
        }

        Ok(Self {
            job_type: record.job_type,
            id,
            status: record.status,
            process,
            requirement,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, PaketError> {
        self.to_record().to_json()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, PaketError> {
        Self::from_record(JobRecord::from_json(bytes)?)
    }
}

// Each status implies what the process block must look like.
fn inconsistency(status: JobStatus, process: &Process) -> Option<&'static str> {
    let outcome = process.recorded_outcome();
    match status {
        JobStatus::Waiting if process.is_started() => Some("is Waiting but its process was started"),
        JobStatus::Waiting if outcome.is_some() => Some("is Waiting but its process has an outcome"),
        JobStatus::Running if !process.is_started() => {
            Some("is Running but its process was never started")
        }
        JobStatus::Running if outcome.is_some() => Some("is Running but its process has an outcome"),
        JobStatus::Finished if !process.is_started() => {
            Some("is Finished but its process was never started")
        }
        JobStatus::Finished if !outcome.is_some_and(ExitOutcome::is_success) => {
            Some("is Finished without a successful outcome")
        }
        JobStatus::Failed if !outcome.is_some_and(|o| !o.is_success()) => {
            Some("is Failed without a failure outcome")
        }
        _ => None,
    }
}
