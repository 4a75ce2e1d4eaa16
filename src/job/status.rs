use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
///
/// Waiting → Running → Finished | Failed, plus Waiting → Failed when the
/// command could not be launched. Nothing moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Waiting,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Waiting,
        JobStatus::Running,
        JobStatus::Finished,
        JobStatus::Failed,
    ];

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Waiting, JobStatus::Running)
                | (JobStatus::Waiting, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Finished)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Waiting => f.pad("Waiting"),
            JobStatus::Running => f.pad("Running"),
            JobStatus::Finished => f.pad("Finished"),
            JobStatus::Failed => f.pad("Failed"),
        }
    }
}
