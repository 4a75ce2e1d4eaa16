//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// paket: track package install and uninstall jobs.
#[derive(Debug, Parser)]
#[command(name = "paket", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./paket.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the configured storage root.
    #[arg(long, global = true)]
    pub storage_root: Option<PathBuf>,

    /// Enables debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Starts a job installing a package.
    Install {
        /// Package name, e.g. acme/widget.
        name: String,

        /// Version constraint, e.g. ^1.0. Omit for unconstrained.
        constraint: Option<String>,

        /// Wait for the job to finish.
        #[arg(long)]
        wait: bool,
    },

    /// Starts a job removing a package.
    Uninstall {
        name: String,

        #[arg(long)]
        wait: bool,
    },

    /// Shows the current status of a job.
    Status { id: String },

    /// Lists every job.
    List,

    /// Deletes a job record.
    Forget { id: String },
}
