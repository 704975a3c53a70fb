//! Outcome classification: mapping a raw process result plus caller
//! intent into success, usage error, or domain failure.
//!
//! Three-way classification (rather than binary success/fail) exists so
//! that "command not found" can never be silently accepted as a valid
//! negative-test outcome: a typo in test code must surface as
//! [`HarnessError::Usage`] no matter what the test expected.

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::error::HarnessError;
use crate::exec::CommandResult;

/// Caller-declared intent for one command invocation. Never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectationMode {
    ExpectSuccess,
    ExpectFailure,
}

/// Category a stderr signature maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// The tool rejected the command itself.
    Usage,
    /// A valid command failed for repository-state reasons.
    Domain,
}

/// Outcome derived from a [`CommandResult`]; recomputed on demand, never
/// stored. Launch failures surface from the executor before any result
/// exists to classify, which is why they have no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Usage,
    Domain,
}

/// Errors raised while loading a signature table.
#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid signature pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Deserialize)]
struct SignatureFile {
    #[serde(default, rename = "signature")]
    signatures: Vec<RawSignature>,
}

#[derive(Debug, Deserialize)]
struct RawSignature {
    category: Category,
    pattern: String,
}

/// Ordered table of stderr signatures; the first matching entry wins.
///
/// The phrasings are tool-version-dependent, so the table is data rather
/// than classifier logic: a version bump of the external tool only
/// requires swapping the table, via [`SignatureTable::from_toml`].
#[derive(Debug, Clone)]
pub struct SignatureTable {
    entries: Vec<(Category, Regex)>,
}

impl SignatureTable {
    /// The default signature table for the given tool binary name.
    ///
    /// The usage marker is listed first so that an unrecognized-command
    /// message also containing a generic failure prefix still classifies
    /// as usage.
    #[must_use]
    pub fn for_tool(tool: &str) -> Self {
        let tool = regex::escape(tool);
        let defaults = [
            (Category::Usage, format!("is not a {tool} command")),
            (Category::Domain, "did not match any files".to_string()),
            (Category::Domain, r"user\.name".to_string()),
            (Category::Domain, r"user\.email".to_string()),
            (Category::Domain, "no upstream branch".to_string()),
            (
                Category::Domain,
                "No configured push destination".to_string(),
            ),
            (Category::Domain, "unable to access".to_string()),
            (Category::Domain, "fatal:".to_string()),
        ];
        let entries = defaults
            .into_iter()
            .filter_map(|(category, pattern)| {
                Regex::new(&pattern).ok().map(|regex| (category, regex))
            })
            .collect();
        Self { entries }
    }

    /// Load a replacement table from TOML text of the form:
    ///
    /// ```toml
    /// [[signature]]
    /// category = "usage"
    /// pattern = "is not a git command"
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError`] if the TOML is malformed or a pattern is
    /// not a valid regular expression.
    pub fn from_toml(text: &str) -> Result<Self, SignatureError> {
        let file: SignatureFile = toml::from_str(text)?;
        let mut entries = Vec::with_capacity(file.signatures.len());
        for raw in file.signatures {
            let regex = Regex::new(&raw.pattern).map_err(|source| SignatureError::Pattern {
                pattern: raw.pattern.clone(),
                source,
            })?;
            entries.push((raw.category, regex));
        }
        Ok(Self { entries })
    }

    /// The category of the first signature matching `stderr`, if any.
    #[must_use]
    pub fn match_stderr(&self, stderr: &str) -> Option<Category> {
        self.entries
            .iter()
            .find(|(_, regex)| regex.is_match(stderr))
            .map(|(category, _)| *category)
    }
}

/// Derive the outcome of a completed command.
///
/// Exit code zero is `Success`. A non-zero exit whose stderr carries a
/// usage signature is `Usage`; any other non-zero exit is `Domain`.
#[must_use]
pub fn outcome(result: &CommandResult, table: &SignatureTable) -> Outcome {
    if result.exit_code == 0 {
        return Outcome::Success;
    }
    match table.match_stderr(&result.stderr) {
        Some(Category::Usage) => Outcome::Usage,
        Some(Category::Domain) | None => Outcome::Domain,
    }
}

/// Check a completed command against the caller's declared intent.
///
/// # Errors
///
/// - [`HarnessError::UnexpectedSuccess`] if the command exited zero under
///   `ExpectFailure`.
/// - [`HarnessError::Usage`] if stderr carries the unrecognized-command
///   signature, regardless of mode.
/// - [`HarnessError::Domain`] if a valid command failed under
///   `ExpectSuccess`, with exit code and captured output attached.
pub fn classify(
    result: &CommandResult,
    mode: ExpectationMode,
    table: &SignatureTable,
) -> Result<(), HarnessError> {
    let derived = outcome(result, table);
    debug!(
        command = %result.command_line(),
        exit_code = result.exit_code,
        ?derived,
        ?mode,
        "classified command outcome"
    );
    match (derived, mode) {
        (Outcome::Success, ExpectationMode::ExpectSuccess)
        | (Outcome::Domain, ExpectationMode::ExpectFailure) => Ok(()),
        (Outcome::Success, ExpectationMode::ExpectFailure) => {
            Err(HarnessError::UnexpectedSuccess {
                command: result.command_line(),
                stdout: result.stdout.clone(),
            })
        }
        (Outcome::Usage, _) => Err(HarnessError::Usage {
            command: result.command_line(),
            exit_code: result.exit_code,
            stderr: result.stderr.clone(),
        }),
        (Outcome::Domain, ExpectationMode::ExpectSuccess) => Err(HarnessError::Domain {
            command: result.command_line(),
            exit_code: result.exit_code,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
        }),
    }
}
