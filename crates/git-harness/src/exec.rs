//! Subprocess execution for the external VCS tool.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::HarnessError;

/// Immutable record of one completed subprocess invocation.
///
/// Produced exactly once per [`execute`] call; read-only afterward. A
/// non-zero exit code is business-level information, not an execution
/// fault, so it lives here rather than in an error.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub command: Vec<String>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// The command line as a single displayable string.
    #[must_use]
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Run `command` in `working_dir`, blocking until it exits, and capture
/// its exit code and text-mode stdout/stderr.
///
/// The working directory must already exist; the executor never creates
/// it. A non-zero exit code is returned inside the `CommandResult`, never
/// as an error.
///
/// # Errors
///
/// Returns [`HarnessError::Execution`] only when the command cannot be
/// launched at all (binary absent, working directory missing, permission
/// denied, or any other OS-level fault), carrying the original
/// [`io::Error`] as its cause.
pub fn execute(command: &[&str], working_dir: &Path) -> Result<CommandResult, HarnessError> {
    execute_with_env(command, working_dir, &[])
}

/// Like [`execute`], with extra environment variables set on the child.
///
/// The scenario graph uses this to pin per-scenario configuration files
/// into every invocation.
///
/// # Errors
///
/// See [`execute`].
pub fn execute_with_env(
    command: &[&str],
    working_dir: &Path,
    env: &[(String, OsString)],
) -> Result<CommandResult, HarnessError> {
    let launch_error = |source: io::Error| HarnessError::Execution {
        command: command.join(" "),
        working_dir: working_dir.to_path_buf(),
        source,
    };

    let Some((program, args)) = command.split_first() else {
        return Err(launch_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty command",
        )));
    };
    if !working_dir.is_dir() {
        return Err(launch_error(io::Error::new(
            io::ErrorKind::NotFound,
            "working directory does not exist",
        )));
    }

    debug!(
        command = %command.join(" "),
        cwd = %working_dir.display(),
        "running command"
    );

    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(working_dir);
    for (key, value) in env {
        cmd.env(key, value);
    }
    let output = cmd.output().map_err(launch_error)?;

    let result = CommandResult {
        command: command.iter().map(ToString::to_string).collect(),
        // A signal-terminated child has no exit code; -1 keeps it distinct
        // from every real code.
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    debug!(
        exit_code = result.exit_code,
        stderr = %result.stderr.trim(),
        "command finished"
    );

    Ok(result)
}
