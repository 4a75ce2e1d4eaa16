use anyhow::{Context, Result};
use clap::Parser;

use paket::cli::{Cli, Command};
use paket::ui::{self, JobProgress};
use paket::{FileJobRepository, JobId, JobOrchestrator, PaketConfig, PaketError, Requirement};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    paket::logging::init(cli.verbose);

    let mut config = PaketConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(root) = cli.storage_root {
        config.storage_root = root;
    }

    let jobs_dir = config.jobs_dir();
    let mut orchestrator = JobOrchestrator::new(
        FileJobRepository::new(&jobs_dir),
        config.package_manager.clone(),
    )
    .with_exit_status_dir(&jobs_dir);
    if config.capture_output {
        orchestrator = orchestrator.with_output_dir(&jobs_dir);
    }

    match cli.command {
        Command::Install {
            name,
            constraint,
            wait,
        } => {
            let requirement = Requirement::new(name, constraint.unwrap_or_default())?;
            let id = orchestrator.submit_install(requirement).await?;
            report_submitted(&orchestrator, &config, &id, wait).await?;
        }
        Command::Uninstall { name, wait } => {
            let requirement = Requirement::unconstrained(name)?;
            let id = orchestrator.submit_uninstall(requirement).await?;
            report_submitted(&orchestrator, &config, &id, wait).await?;
        }
        Command::Status { id } => match orchestrator.get_job(&id).await {
            Ok(job) => ui::print_job(&job),
            Err(PaketError::JobNotFound(id)) => {
                eprintln!("No job with id {id}");
                std::process::exit(2);
            }
            Err(e) => return Err(e.into()),
        },
        Command::List => {
            let mut jobs = orchestrator.list_jobs().await?;
            jobs.sort_by_key(|job| job.process().started_at());
            if jobs.is_empty() {
                println!("No jobs.");
            }
            for job in &jobs {
                println!("{}", ui::job_line(job));
            }
        }
        Command::Forget { id } => {
            orchestrator
                .forget(&id)
                .await
                .with_context(|| format!("failed to forget job {id}"))?;
            println!("Forgot job {id}");
        }
    }

    Ok(())
}

async fn report_submitted(
    orchestrator: &JobOrchestrator<FileJobRepository>,
    config: &PaketConfig,
    id: &JobId,
    wait: bool,
) -> Result<()> {
    let job = orchestrator.get_job(id.as_str()).await?;
    if !wait || job.is_finished() {
        ui::print_job(&job);
        return Ok(());
    }

    let progress = JobProgress::start(&job);
    let job = orchestrator
        .wait_for(id.as_str(), config.poll_interval(), config.wait_timeout())
        .await?;
    progress.finish(&job);
    Ok(())
}
