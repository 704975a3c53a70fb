//! Integration-test harness for driving an external version-control CLI
//! through real subprocess invocations against disposable on-disk
//! repositories.
//!
//! Components:
//!
//! - [`exec`]: runs a command in a working directory, capturing exit
//!   code/stdout/stderr, and separates *unable to launch* from *ran and
//!   failed*.
//! - [`classify`]: maps a captured result plus a caller-declared
//!   expectation into success, usage error, or domain failure, raising on
//!   mismatch.
//! - [`validate`]: checks on-disk repository layout against fixed
//!   structural invariants, independent of command exit codes.
//! - [`scenario`]: a dependency graph of reusable state builders (bare
//!   remote, initialized repo, staged file, committed repo, clone, push,
//!   pull) with memoized per-test resolution and reverse-order finalizers
//!   for global configuration mutations.
//!
//! Tests typically construct a [`Scenario`], resolve the [`scenario::Node`]
//! they need, perform one more operation, and assert via
//! [`classify::classify`] or [`validate::validate_repository_layout`].

pub mod classify;
pub mod error;
pub mod exec;
pub mod scenario;
pub mod validate;

pub use classify::{Category, ExpectationMode, Outcome, SignatureTable, classify, outcome};
pub use error::HarnessError;
pub use exec::{CommandResult, execute, execute_with_env};
pub use scenario::{DEFAULT_BRANCH, DEFAULT_REMOTE, Node, RepoHandle, RepoKind, Scenario};
pub use validate::validate_repository_layout;
