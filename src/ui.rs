//! Terminal output: spinners and colored job status.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::job::{Job, JobStatus};

/// Spinner shown while waiting on a job.
pub struct JobProgress {
    pb: ProgressBar,
}

impl JobProgress {
    pub fn start(job: &Job) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("{} {}", job.job_type(), describe_target(job)));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    pub fn finish(&self, job: &Job) {
        self.pb.finish_and_clear();
        print_job(job);
    }
}

pub fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Waiting => Style::new().yellow(),
        JobStatus::Running => Style::new().cyan(),
        JobStatus::Finished => Style::new().green().bold(),
        JobStatus::Failed => Style::new().red().bold(),
    }
}

fn describe_target(job: &Job) -> String {
    job.requirement()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string())
}

/// One-line summary used by `list`.
pub fn job_line(job: &Job) -> String {
    format!(
        "{}  {:<9} {:<9} {}",
        job.id(),
        job.job_type(),
        status_style(job.status()).apply_to(job.status()),
        describe_target(job)
    )
}

pub fn print_job(job: &Job) {
    let process = job.process();
    println!("{}", job_line(job));
    if !process.command_line().is_empty() {
        println!("  command: {}", process.command_line());
    }
    if let Some(pid) = process.pid() {
        println!("  pid:     {pid}");
    }
    if let Some(started) = process.started_at() {
        println!("  started: {}", started.to_rfc3339());
    }
    if let Some(finished) = process.finished_at() {
        println!("  ended:   {}", finished.to_rfc3339());
    }
    if let Some(outcome) = process.recorded_outcome() {
        println!("  outcome: {outcome}");
    }
}
