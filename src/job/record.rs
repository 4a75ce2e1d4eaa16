//! Persisted schema of a job.
//!
//! Exactly five top-level fields: `type`, `id`, `status`, `process` and
//! `requirement`. Anything else, or anything missing, is a malformed record.

use serde::{Deserialize, Serialize};

use super::{JobStatus, JobType};
use crate::error::PaketError;
use crate::process::ProcessRecord;
use crate::requirement::RequirementRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobRecord {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub id: String,
    pub status: JobStatus,
    pub process: ProcessRecord,
    pub requirement: RequirementRecord,
}

impl JobRecord {
    pub fn from_json(bytes: &[u8]) -> Result<Self, PaketError> {
        serde_json::from_slice(bytes).map_err(|e| PaketError::MalformedJobRecord(e.to_string()))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, PaketError> {
        serde_json::to_vec_pretty(self).map_err(|e| PaketError::MalformedJobRecord(e.to_string()))
    }
}
