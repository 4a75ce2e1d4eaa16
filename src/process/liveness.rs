use chrono::{DateTime, Utc};
use sysinfo::{Pid, ProcessStatus, System};

// Recorded start times are taken right after spawning; the OS reports
// whole seconds.
const START_TIME_SLACK_SECS: i64 = 1;

/// Looks a PID up in the OS process table.
///
/// Zombies count as dead. When `started_at` is known, a process that began
/// after it is a different process that reused the PID.
pub(crate) fn pid_is_alive(pid: u32, started_at: Option<DateTime<Utc>>) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return false;
    }
    let Some(process) = system.process(pid) else {
        return false;
    };
    if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
        return false;
    }
    match started_at {
        Some(started) => process.start_time() as i64 <= started.timestamp() + START_TIME_SLACK_SECS,
        None => true,
    }
}
