//! External command invocations backing a job.
//!
//! A [`Process`] is created empty when a job is submitted and replaced once
//! the command is actually spawned. The OS handle lives only as long as the
//! orchestrator that spawned it; what gets persisted is the command line,
//! the PID and whatever outcome was observed. Exit codes that must outlive
//! the handle go to a status file (see [`exit_status`]).

pub mod exit_status;
mod liveness;
mod outcome;

pub use outcome::{ExitOutcome, FailureReason};

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::PaketError;
use crate::package_manager::CommandLine;

/// The command could not be launched.
#[derive(Debug, Error)]
#[error("failed to spawn `{command_line}`: {source}")]
pub struct SpawnError {
    pub command_line: String,
    #[source]
    pub source: io::Error,
}

/// Shared handle to a spawned child. Cloning shares the same child.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    child: Arc<Mutex<Child>>,
}

impl ProcessHandle {
    fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Arc::new(Mutex::new(child)),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking status check; reaps the child once it has exited.
    pub fn try_status(&self) -> io::Result<Option<ExitStatus>> {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_wait()
    }
}

/// Persisted shape of a [`Process`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessRecord {
    pub command_line: String,
    #[serde(default)]
    pub pid: Option<u32>,
    /// Liveness as last observed; informational only.
    #[serde(default)]
    pub alive: Option<bool>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: Option<ExitOutcome>,
}

#[derive(Debug, Clone)]
pub struct Process {
    command_line: String,
    pid: Option<u32>,
    alive: Option<bool>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<ExitOutcome>,
    handle: Option<ProcessHandle>,
}

impl Process {
    /// Placeholder for a job whose command has not been launched.
    pub fn empty() -> Self {
        Self {
            command_line: String::new(),
            pid: None,
            alive: None,
            started_at: None,
            finished_at: None,
            outcome: None,
            handle: None,
        }
    }

    /// Spawns `command` without waiting for it.
    ///
    /// Stdin is closed. Stdout and stderr are appended to `output` when
    /// given, discarded otherwise. With `exit_status_file` the exit code is
    /// also written there once the command ends.
    pub fn start(
        command: &CommandLine,
        output: Option<&Path>,
        exit_status_file: Option<&Path>,
    ) -> Result<Self, SpawnError> {
        let command_line = command.to_string();
        let spawn_error = |source: io::Error| SpawnError {
            command_line: command_line.clone(),
            source,
        };

        let mut cmd = match exit_status_file {
            Some(path) => exit_status::wrapped(
                &command.program,
                &command.args,
                command.working_dir.as_deref(),
                path,
            )
            .map_err(spawn_error)?,
            None => {
                let mut cmd = Command::new(&command.program);
                cmd.args(&command.args);
                cmd
            }
        };
        cmd.stdin(Stdio::null());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        match output {
            Some(path) => {
                let log = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(spawn_error)?;
                let log_err = log.try_clone().map_err(spawn_error)?;
                cmd.stdout(log).stderr(log_err);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = cmd.spawn().map_err(spawn_error)?;
        let handle = ProcessHandle::new(child);
        debug!(pid = handle.pid(), command = %command_line, "spawned process");

        Ok(Self {
            command_line,
            pid: Some(handle.pid()),
            alive: Some(true),
            started_at: Some(Utc::now()),
            finished_at: None,
            outcome: None,
            handle: Some(handle),
        })
    }

    /// A process that never ran because spawning failed.
    pub fn failed_to_start(command: &CommandLine, err: &SpawnError) -> Self {
        Self {
            command_line: command.to_string(),
            alive: Some(false),
            finished_at: Some(Utc::now()),
            outcome: Some(ExitOutcome::failure(
                FailureReason::SpawnError,
                err.source.raw_os_error(),
                err.source.to_string(),
            )),
            ..Self::empty()
        }
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Outcome frozen by [`Process::record_outcome`], if any.
    pub fn recorded_outcome(&self) -> Option<&ExitOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.pid.is_some()
    }

    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    /// Reconnects a live handle to a process reloaded from storage.
    /// Ignored unless the PIDs match.
    pub fn attach(&mut self, handle: ProcessHandle) -> bool {
        if self.pid == Some(handle.pid()) && self.outcome.is_none() {
            self.handle = Some(handle);
            true
        } else {
            false
        }
    }

    /// Whether the OS process is still running. An exited process is not an
    /// error, just `false`.
    pub fn is_alive(&self) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        if let Some(handle) = &self.handle {
            return matches!(handle.try_status(), Ok(None));
        }
        match self.pid {
            Some(pid) => liveness::pid_is_alive(pid, self.started_at),
            None => false,
        }
    }

    /// How the process ended, or `None` while it is still running.
    ///
    /// Without a handle the exit status cannot be observed here, so a dead
    /// process reloaded from storage reports
    /// [`FailureReason::UnknownOutcome`]. Callers holding an exit status
    /// file should consult it first.
    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        if let Some(outcome) = &self.outcome {
            return Some(outcome.clone());
        }
        if let Some(handle) = &self.handle {
            return match handle.try_status() {
                Ok(Some(status)) => Some(ExitOutcome::from_status(status)),
                Ok(None) => None,
                Err(e) => Some(ExitOutcome::unknown(format!(
                    "could not query process {}: {e}",
                    handle.pid()
                ))),
            };
        }
        match self.pid {
            None => Some(ExitOutcome::never_started()),
            Some(pid) if liveness::pid_is_alive(pid, self.started_at) => None,
            Some(pid) => Some(ExitOutcome::unknown(format!(
                "process {pid} exited while unobserved"
            ))),
        }
    }

    /// Freezes the outcome and drops the live handle.
    pub fn record_outcome(&mut self, outcome: ExitOutcome) {
        self.outcome = Some(outcome);
        self.alive = Some(false);
        self.finished_at = Some(Utc::now());
        self.handle = None;
    }

    pub fn to_record(&self) -> ProcessRecord {
        ProcessRecord {
            command_line: self.command_line.clone(),
            pid: self.pid,
            alive: self.alive,
            started_at: self.started_at,
            finished_at: self.finished_at,
            outcome: self.outcome.clone(),
        }
    }

    pub fn from_record(record: ProcessRecord) -> Result<Self, PaketError> {
        if record.pid.is_some() && record.command_line.is_empty() {
            return Err(PaketError::MalformedJobRecord(
                "process has a pid but no command line".into(),
            ));
        }
        Ok(Self {
            command_line: record.command_line,
            pid: record.pid,
            alive: record.alive,
            started_at: record.started_at,
            finished_at: record.finished_at,
            outcome: record.outcome,
            handle: None,
        })
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::empty()
    }
}

// The live handle is not part of a process's identity.
impl PartialEq for Process {
    fn eq(&self, other: &Self) -> bool {
        self.to_record() == other.to_record()
    }
}

impl Eq for Process {}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_until_dead(process: &Process) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while process.is_alive() {
            assert!(Instant::now() < deadline, "process did not exit in time");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn empty_process_never_started() {
        let process = Process::empty();
        assert!(!process.is_started());
        assert!(!process.is_alive());
        assert_eq!(process.command_line(), "");
        assert_eq!(process.exit_outcome(), Some(ExitOutcome::never_started()));
    }

    #[cfg(unix)]
    #[test]
    fn successful_command_reports_success() {
        let process = Process::start(&CommandLine::new("true"), None, None).unwrap();
        assert!(process.is_started());
        assert_eq!(process.command_line(), "true");
        wait_until_dead(&process);
        assert_eq!(process.exit_outcome(), Some(ExitOutcome::Success));
        // Already exited: still not an error.
        assert!(!process.is_alive());
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_exit_code() {
        let cmd = CommandLine::new("sh").arg("-c").arg("exit 3");
        let process = Process::start(&cmd, None, None).unwrap();
        wait_until_dead(&process);
        let outcome = process.exit_outcome().unwrap();
        assert_eq!(outcome.reason(), Some(FailureReason::NonZeroExit));
        assert!(matches!(outcome, ExitOutcome::Failure { code: Some(3), .. }));
    }

    #[cfg(unix)]
    #[test]
    fn running_command_has_no_outcome_yet() {
        let process = Process::start(&CommandLine::new("sleep").arg("1"), None, None).unwrap();
        assert!(process.is_alive());
        assert_eq!(process.exit_outcome(), None);
        wait_until_dead(&process);
        assert_eq!(process.exit_outcome(), Some(ExitOutcome::Success));
    }

    #[cfg(unix)]
    #[test]
    fn output_is_appended_to_log_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("job.log");
        let cmd = CommandLine::new("sh").arg("-c").arg("echo out; echo err >&2");
        let process = Process::start(&cmd, Some(&log), None).unwrap();
        wait_until_dead(&process);

        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("out"));
        assert!(contents.contains("err"));
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let cmd = CommandLine::new("paket-test-no-such-binary").arg("require");
        let err = Process::start(&cmd, None, None).unwrap_err();
        assert_eq!(err.command_line, "paket-test-no-such-binary require");
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);

        let failed = Process::failed_to_start(&cmd, &err);
        assert!(!failed.is_alive());
        assert!(!failed.is_started());
        assert_eq!(
            failed.exit_outcome().and_then(|o| o.reason()),
            Some(FailureReason::SpawnError)
        );
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_is_written_to_status_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let status_file = dir.path().join("job.exit");
        let cmd = CommandLine::new("sh").arg("-c").arg("exit 3");
        let process = Process::start(&cmd, None, Some(&status_file)).unwrap();
        assert_eq!(process.command_line(), "sh -c 'exit 3'");
        wait_until_dead(&process);

        // The handle still sees the command's own exit code.
        assert!(matches!(
            process.exit_outcome(),
            Some(ExitOutcome::Failure { code: Some(3), .. })
        ));
        let written = std::fs::read_to_string(&status_file).unwrap();
        assert_eq!(
            exit_status::parse(&written),
            Some(ExitOutcome::from_code(3))
        );
    }

    #[cfg(unix)]
    #[test]
    fn missing_binary_is_spawn_error_with_status_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let status_file = dir.path().join("job.exit");
        let cmd = CommandLine::new("paket-test-no-such-binary").arg("require");
        let err = Process::start(&cmd, None, Some(&status_file)).unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
        assert!(!status_file.exists());
    }

    #[cfg(unix)]
    #[test]
    fn reloaded_dead_process_has_unknown_outcome() {
        let process = Process::start(&CommandLine::new("true"), None, None).unwrap();
        wait_until_dead(&process);

        let reloaded = Process::from_record(process.to_record()).unwrap();
        assert!(reloaded.handle().is_none());
        assert!(!reloaded.is_alive());
        assert_eq!(
            reloaded.exit_outcome().and_then(|o| o.reason()),
            Some(FailureReason::UnknownOutcome)
        );
    }

    #[cfg(unix)]
    #[test]
    fn attach_restores_exit_status() {
        let process = Process::start(&CommandLine::new("false"), None, None).unwrap();
        let handle = process.handle().cloned().unwrap();
        wait_until_dead(&process);

        let mut reloaded = Process::from_record(process.to_record()).unwrap();
        assert!(reloaded.attach(handle));
        assert!(matches!(
            reloaded.exit_outcome(),
            Some(ExitOutcome::Failure { reason: FailureReason::NonZeroExit, code: Some(1), .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn attach_rejects_foreign_handle() {
        let other = Process::start(&CommandLine::new("true"), None, None).unwrap();
        let handle = other.handle().cloned().unwrap();
        let mut process = Process::from_record(ProcessRecord {
            command_line: "composer require acme/widget".into(),
            pid: Some(handle.pid().wrapping_add(1)),
            ..Default::default()
        })
        .unwrap();
        assert!(!process.attach(handle));
        wait_until_dead(&other);
    }

    #[test]
    fn record_outcome_freezes_state() {
        let mut process = Process::from_record(ProcessRecord {
            command_line: "composer remove acme/widget".into(),
            pid: Some(std::process::id()),
            alive: Some(true),
            started_at: Some(Utc::now()),
            ..Default::default()
        })
        .unwrap();
        assert!(process.is_alive());

        process.record_outcome(ExitOutcome::Success);
        assert!(!process.is_alive());
        assert!(process.finished_at().is_some());
        assert_eq!(process.to_record().alive, Some(false));
        assert_eq!(process.exit_outcome(), Some(ExitOutcome::Success));
    }

    #[test]
    fn pid_without_command_line_is_malformed() {
        let record = ProcessRecord {
            pid: Some(42),
            ..Default::default()
        };
        assert!(matches!(
            Process::from_record(record),
            Err(PaketError::MalformedJobRecord(_))
        ));
    }
}
