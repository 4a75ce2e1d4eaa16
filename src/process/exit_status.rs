//! Durable exit codes for processes that outlive the invocation that
//! spawned them.
//!
//! On unix the command runs under `/bin/sh`, which writes the command's
//! exit code to a status file before exiting with that same code. Any later
//! reader can then tell success from failure even though it never owned the
//! child.

use std::io;
use std::path::Path;
#[cfg(unix)]
use std::path::PathBuf;
use std::process::Command;

use super::ExitOutcome;

/// `$0` is the status file, `$@` the command. The code is written to a
/// temp file and renamed so a reader never sees a partial write.
#[cfg(unix)]
const SCRIPT: &str = r#""$@"; status=$?; printf '%s\n' "$status" > "$0.tmp" && mv -f "$0.tmp" "$0"; exit "$status""#;

/// Builds a command that runs `program args..` and records its exit code at
/// `status_file`.
///
/// The program is resolved before anything is spawned, so a missing or
/// non-executable binary still surfaces as a spawn error.
#[cfg(unix)]
pub(crate) fn wrapped(
    program: &str,
    args: &[String],
    working_dir: Option<&Path>,
    status_file: &Path,
) -> io::Result<Command> {
    let program = resolve_program(Path::new(program), working_dir)?;
    let status_file = std::path::absolute(status_file)?;

    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c")
        .arg(SCRIPT)
        .arg(status_file)
        .arg(program)
        .args(args);
    Ok(cmd)
}

#[cfg(not(unix))]
pub(crate) fn wrapped(
    program: &str,
    args: &[String],
    _working_dir: Option<&Path>,
    _status_file: &Path,
) -> io::Result<Command> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

/// Finds `program` the way `execvp` would: paths are taken as given
/// (relative to `working_dir` when set), bare names are searched in `PATH`.
#[cfg(unix)]
fn resolve_program(program: &Path, working_dir: Option<&Path>) -> io::Result<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        let path = match working_dir {
            Some(dir) if program.is_relative() => dir.join(program),
            _ => program.to_path_buf(),
        };
        ensure_executable(&path)?;
        return std::path::absolute(path);
    }

    let search = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&search) {
        let candidate = dir.join(program);
        if ensure_executable(&candidate).is_ok() {
            return Ok(candidate);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found in PATH", program.display()),
    ))
}

#[cfg(unix)]
fn ensure_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)?;
    if metadata.is_file() && metadata.permissions().mode() & 0o111 != 0 {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("{} is not executable", path.display()),
        ))
    }
}

/// Reads an exit code written by [`wrapped`]. Garbage yields `None`.
pub fn parse(contents: &str) -> Option<ExitOutcome> {
    contents.trim().parse::<i32>().ok().map(ExitOutcome::from_code)
}
