//! Durable tracking of package install and uninstall jobs.
//!
//! A [`Job`] wraps the external [`Process`] running the package manager and
//! the [`Requirement`] it acts on. Jobs are persisted through a
//! [`JobRepository`] so that one invocation can submit a job and a later one
//! can poll it. The [`JobOrchestrator`] ties the pieces together.

pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod package_manager;
pub mod process;
pub mod repository;
pub mod requirement;
pub mod ui;

pub use config::PaketConfig;
pub use error::{PaketError, RepositoryError};
pub use job::{Job, JobId, JobRecord, JobStatus, JobType};
pub use orchestrator::JobOrchestrator;
pub use package_manager::{CommandLine, PackageManager};
pub use process::{ExitOutcome, FailureReason, Process, SpawnError};
pub use repository::{FileJobRepository, JobRepository, MemoryJobRepository};
pub use requirement::{Requirement, RequirementEvent, RequirementEvents};
