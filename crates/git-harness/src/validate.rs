//! Structural validation of on-disk repository layout.
//!
//! Purely structural: never invokes the external tool and is independent
//! of any command's exit code.

use std::fs;
use std::path::Path;

use crate::error::HarnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    const fn describe(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Dir => "directory",
        }
    }
}

/// Minimal entries a repository metadata directory must contain. Holds
/// for both freshly initialized and cloned repositories.
const REQUIRED_ENTRIES: &[(&str, EntryKind)] = &[
    ("HEAD", EntryKind::File),
    ("config", EntryKind::File),
    ("hooks", EntryKind::Dir),
    ("info", EntryKind::Dir),
    ("objects", EntryKind::Dir),
    ("refs", EntryKind::Dir),
];

/// Validate the required structure of a repository metadata directory
/// (the `.git` directory of a work tree, or the top of a bare
/// repository).
///
/// Checks that each required entry exists with the correct kind, and that
/// HEAD holds either a symbolic reference of the form
/// `ref: refs/heads/<name>` or a direct 40-hex object id (a detached
/// head, as some clones produce).
///
/// # Errors
///
/// Returns [`HarnessError::Structural`] naming the missing or malformed
/// entry.
pub fn validate_repository_layout(root: &Path) -> Result<(), HarnessError> {
    for (name, kind) in REQUIRED_ENTRIES {
        let path = root.join(name);
        if !path.exists() {
            return Err(structural(
                root,
                format!("missing required {} `{name}`", kind.describe()),
            ));
        }
        let kind_matches = match kind {
            EntryKind::File => path.is_file(),
            EntryKind::Dir => path.is_dir(),
        };
        if !kind_matches {
            return Err(structural(
                root,
                format!("`{name}` exists but is not a {}", kind.describe()),
            ));
        }
    }

    let head = fs::read_to_string(root.join("HEAD"))
        .map_err(|err| structural(root, format!("unreadable HEAD: {err}")))?;
    validate_head_content(root, head.trim())
}

fn validate_head_content(root: &Path, head: &str) -> Result<(), HarnessError> {
    if let Some(branch) = head.strip_prefix("ref: refs/heads/") {
        if branch.is_empty() {
            return Err(structural(root, "HEAD names an empty branch".to_string()));
        }
        return Ok(());
    }
    if head.len() == 40 && head.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Ok(());
    }
    Err(structural(root, format!("unexpected HEAD content: {head}")))
}

fn structural(root: &Path, problem: String) -> HarnessError {
    HarnessError::Structural {
        root: root.to_path_buf(),
        problem,
    }
}
