use std::fmt;
use std::process::ExitStatus;

use serde::{Deserialize, Serialize};

/// Why a process did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Nothing was ever launched.
    NeverStarted,
    /// The command could not be launched at all.
    SpawnError,
    /// The command ran and exited unsuccessfully (or was killed by a signal).
    NonZeroExit,
    /// The process is gone but its exit status was not observed.
    UnknownOutcome,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NeverStarted => write!(f, "never started"),
            FailureReason::SpawnError => write!(f, "spawn error"),
            FailureReason::NonZeroExit => write!(f, "non-zero exit"),
            FailureReason::UnknownOutcome => write!(f, "unknown outcome"),
        }
    }
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExitOutcome {
    Success,
    Failure {
        reason: FailureReason,
        #[serde(default)]
        code: Option<i32>,
        #[serde(default)]
        message: String,
    },
}

impl ExitOutcome {
    pub fn failure(reason: FailureReason, code: Option<i32>, message: impl Into<String>) -> Self {
        ExitOutcome::Failure {
            reason,
            code,
            message: message.into(),
        }
    }

    pub fn never_started() -> Self {
        Self::failure(FailureReason::NeverStarted, None, "process was never started")
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::failure(FailureReason::UnknownOutcome, None, message)
    }

    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return ExitOutcome::Success;
        }
        match status.code() {
            Some(code) => Self::from_code(code),
            None => Self::failure(FailureReason::NonZeroExit, None, status.to_string()),
        }
    }

    /// Outcome of a plain exit code, as recorded in a status file.
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            ExitOutcome::Success
        } else {
            Self::failure(
                FailureReason::NonZeroExit,
                Some(code),
                format!("exited with status {code}"),
            )
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }

    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            ExitOutcome::Success => None,
            ExitOutcome::Failure { reason, .. } => Some(*reason),
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Success => write!(f, "success"),
            ExitOutcome::Failure {
                reason, message, ..
            } if message.is_empty() => write!(f, "failed ({reason})"),
            ExitOutcome::Failure {
                reason, message, ..
            } => write!(f, "failed ({reason}): {message}"),
        }
    }
}
