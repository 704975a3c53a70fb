//! Error taxonomy shared by the executor, classifier, validator, and
//! scenario graph.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the harness.
///
/// The first three variants mirror the three failure classes a subprocess
/// invocation can produce: the command never ran (`Execution`), the tool
/// rejected the command itself (`Usage`), or a valid command failed for
/// repository-state reasons (`Domain`). Every variant carries enough
/// context to diagnose without re-running the command.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The command could not be launched at all: binary absent, working
    /// directory missing, permission denied, or any other OS-level fault.
    #[error("failed to launch `{command}` in {}: {source}", .working_dir.display())]
    Execution {
        command: String,
        working_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tool reported the command as unrecognized. This is always a
    /// test-authoring defect, never an acceptable negative-test outcome.
    #[error("unrecognized command `{command}` (exit {exit_code})\nstderr: {stderr}")]
    Usage {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A valid command exited non-zero because of repository, remote, or
    /// configuration state, while the caller expected success.
    #[error("command `{command}` failed (exit {exit_code})\nstdout: {stdout}\nstderr: {stderr}")]
    Domain {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// A command the caller expected to fail exited zero.
    #[error("command `{command}` succeeded but was expected to fail\nstdout: {stdout}")]
    UnexpectedSuccess { command: String, stdout: String },

    /// The on-disk repository layout violates a required structural
    /// invariant.
    #[error("invalid repository layout at {}: {problem}", .root.display())]
    Structural { root: PathBuf, problem: String },

    /// Filesystem fault while preparing scenario state.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
