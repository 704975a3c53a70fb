//! Scenario graph: composable, dependency-ordered repository state
//! builders.
//!
//! A [`Scenario`] is the per-test scope. It owns a unique temporary
//! subtree (no sharing or reuse across tests), resolves state-builder
//! [`Node`]s lazily with memoization, and keeps a finalizer stack for
//! every process-global configuration mutation a builder performs.
//! Finalizers unwind in strict reverse-of-registration order on every
//! exit path, including assertion failure, via `Drop`.
//!
//! The "global" configuration scope is pinned per scenario: every
//! executed command carries `GIT_CONFIG_GLOBAL` pointing at a file inside
//! the scenario's subtree (plus `GIT_CONFIG_NOSYSTEM=1`), so concurrent
//! tests cannot interfere with each other or with the developer's real
//! configuration, while the mutation/finalizer lifecycle stays
//! observable.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::classify::{ExpectationMode, SignatureTable, classify};
use crate::error::HarnessError;
use crate::exec::{CommandResult, execute_with_env};

/// Default remote name used by composite nodes.
pub const DEFAULT_REMOTE: &str = "origin";
/// Default branch name assigned by fresh initialization.
pub const DEFAULT_BRANCH: &str = "main";

/// Whether a repository has a work tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoKind {
    NonBare,
    Bare,
}

/// Filesystem handle to one repository built by a scenario step.
///
/// Owned by the test invocation that requested it; the surrounding
/// temporary-directory cleanup destroys it, never the harness.
#[derive(Debug, Clone)]
pub struct RepoHandle {
    pub path: PathBuf,
    pub kind: RepoKind,
}

impl RepoHandle {
    /// The metadata directory holding HEAD, config, refs and friends:
    /// `.git` for a work tree, the repository root for a bare repository.
    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        match self.kind {
            RepoKind::NonBare => self.path.join(".git"),
            RepoKind::Bare => self.path.clone(),
        }
    }
}

/// Named state-builder nodes, listed in dependency order.
///
/// The prerequisite graph is acyclic and each node is resolved at most
/// once per scenario; see [`Scenario::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    /// Bare repository acting as a remote, HEAD pointing at `main`.
    BareRemote,
    /// Freshly initialized local repository with default branch `main`.
    LocalInit,
    /// `LocalInit` plus a global identity (`Test User <test@example.com>`).
    LocalWithIdentity,
    /// `LocalWithIdentity` plus `file.txt` created and staged.
    StagedFile,
    /// `StagedFile` committed as `"Initial commit"`.
    Commit,
    /// Clone of `BareRemote` with a local-identity commit on top.
    Cloned,
    /// `Commit` with `BareRemote` configured as remote `origin`.
    RemoteConfigured,
    /// `RemoteConfigured` after `push -u origin main`.
    Pushed,
    /// A second client that cloned `BareRemote` before the push, then
    /// pulled the pushed commit.
    Pulled,
}

/// A registered reversal for one process-global mutation.
struct Finalizer {
    description: String,
    command: Vec<String>,
}

/// Per-test scenario scope.
pub struct Scenario {
    tool: String,
    signatures: SignatureTable,
    root: TempDir,
    global_config: PathBuf,
    built: RefCell<HashMap<Node, RepoHandle>>,
    finalizers: RefCell<Vec<Finalizer>>,
    registered_keys: RefCell<HashSet<String>>,
    next_dir: Cell<u32>,
}

impl Scenario {
    /// A fresh scenario driving the `git` binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario's temporary subtree cannot be
    /// created.
    pub fn new() -> Result<Self, HarnessError> {
        Self::for_tool("git")
    }

    /// A fresh scenario driving the given tool binary.
    ///
    /// # Errors
    ///
    /// See [`Scenario::new`].
    pub fn for_tool(tool: &str) -> Result<Self, HarnessError> {
        let root = TempDir::new()?;
        let global_config = root.path().join("gitconfig.global");
        fs::write(&global_config, "")?;
        Ok(Self {
            tool: tool.to_string(),
            signatures: SignatureTable::for_tool(tool),
            global_config,
            built: RefCell::new(HashMap::new()),
            finalizers: RefCell::new(Vec::new()),
            registered_keys: RefCell::new(HashSet::new()),
            next_dir: Cell::new(0),
            root,
        })
    }

    /// Pin the scenario's global configuration scope to a caller-owned
    /// file, e.g. to inspect it after the scenario has been torn down.
    /// The file must already exist.
    #[must_use]
    pub fn with_global_config_file(mut self, path: &Path) -> Self {
        self.global_config = path.to_path_buf();
        self
    }

    /// Replace the stderr signature table, e.g. after a tool version bump.
    pub fn set_signatures(&mut self, table: SignatureTable) {
        self.signatures = table;
    }

    /// The signature table used for classification.
    #[must_use]
    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    /// The scenario's private scratch root.
    #[must_use]
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// A fresh, uniquely named directory under the scenario root. No two
    /// calls return the same path within one scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn fresh_dir(&self, label: &str) -> Result<PathBuf, HarnessError> {
        let n = self.next_dir.get();
        self.next_dir.set(n + 1);
        let dir = self.root.path().join(format!("{label}-{n}"));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn envs(&self) -> Vec<(String, OsString)> {
        vec![
            (
                "GIT_CONFIG_GLOBAL".to_string(),
                self.global_config.clone().into_os_string(),
            ),
            ("GIT_CONFIG_NOSYSTEM".to_string(), OsString::from("1")),
        ]
    }

    /// Run the tool with `args` in an arbitrary directory, returning the
    /// raw result without classifying it.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Execution`] only if the command cannot be
    /// launched.
    pub fn run_in(&self, dir: &Path, args: &[&str]) -> Result<CommandResult, HarnessError> {
        let mut command = Vec::with_capacity(args.len() + 1);
        command.push(self.tool.as_str());
        command.extend_from_slice(args);
        execute_with_env(&command, dir, &self.envs())
    }

    /// Run the tool with `args` in the repository's work tree (or bare
    /// root), returning the raw result.
    ///
    /// # Errors
    ///
    /// See [`Scenario::run_in`].
    pub fn run(&self, repo: &RepoHandle, args: &[&str]) -> Result<CommandResult, HarnessError> {
        self.run_in(&repo.path, args)
    }

    /// Run the tool and require the outcome to classify as success.
    ///
    /// # Errors
    ///
    /// Launch failures and any non-success classification propagate.
    pub fn run_expect_success(
        &self,
        repo: &RepoHandle,
        args: &[&str],
    ) -> Result<CommandResult, HarnessError> {
        let result = self.run(repo, args)?;
        classify(&result, ExpectationMode::ExpectSuccess, &self.signatures)?;
        Ok(result)
    }

    /// Run the tool and require the outcome to classify as an expected
    /// domain failure. An unrecognized command still errors.
    ///
    /// # Errors
    ///
    /// Launch failures, usage errors, and unexpected success propagate.
    pub fn run_expect_failure(
        &self,
        repo: &RepoHandle,
        args: &[&str],
    ) -> Result<CommandResult, HarnessError> {
        let result = self.run(repo, args)?;
        classify(&result, ExpectationMode::ExpectFailure, &self.signatures)?;
        Ok(result)
    }

    /// Write a process-global (non-repository-scoped) configuration key
    /// and register a finalizer that removes it on teardown.
    ///
    /// Writing the same key twice keeps a single finalizer: the last
    /// value wins while the scenario is live, and the key is absent after
    /// teardown.
    ///
    /// # Errors
    ///
    /// Propagates launch failures and non-success classification of the
    /// config write.
    pub fn set_global_config(&self, key: &str, value: &str) -> Result<(), HarnessError> {
        let result = self.run_in(self.root.path(), &["config", "--global", key, value])?;
        classify(&result, ExpectationMode::ExpectSuccess, &self.signatures)?;
        if self.registered_keys.borrow_mut().insert(key.to_string()) {
            self.finalizers.borrow_mut().push(Finalizer {
                description: format!("unset global {key}"),
                command: vec![
                    "config".to_string(),
                    "--global".to_string(),
                    "--unset-all".to_string(),
                    key.to_string(),
                ],
            });
        }
        debug!(key, value, "set global config");
        Ok(())
    }

    /// Configure `user.name`/`user.email` in the repository's own config.
    ///
    /// # Errors
    ///
    /// Propagates launch failures and non-success classification.
    pub fn configure_local_identity(
        &self,
        repo: &RepoHandle,
        name: &str,
        email: &str,
    ) -> Result<(), HarnessError> {
        self.run_expect_success(repo, &["config", "user.name", name])?;
        self.run_expect_success(repo, &["config", "user.email", email])?;
        Ok(())
    }

    /// Configure `user.name`/`user.email` in the global scope, with
    /// finalizers that remove both keys on teardown.
    ///
    /// # Errors
    ///
    /// Propagates launch failures and non-success classification.
    pub fn configure_global_identity(&self, name: &str, email: &str) -> Result<(), HarnessError> {
        self.set_global_config("user.name", name)?;
        self.set_global_config("user.email", email)?;
        Ok(())
    }

    /// Create a file with sample content inside the repository work tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_file(&self, repo: &RepoHandle, name: &str) -> Result<PathBuf, HarnessError> {
        let path = repo.path.join(name);
        fs::write(&path, format!("This is test content for {name}\n"))?;
        debug!(file = %path.display(), "created file in work tree");
        Ok(path)
    }

    /// Stage a pathspec.
    ///
    /// # Errors
    ///
    /// Propagates launch failures and non-success classification.
    pub fn stage(&self, repo: &RepoHandle, pathspec: &str) -> Result<(), HarnessError> {
        self.run_expect_success(repo, &["add", pathspec])?;
        Ok(())
    }

    /// Commit staged changes with the given message.
    ///
    /// # Errors
    ///
    /// Propagates launch failures and non-success classification.
    pub fn commit(&self, repo: &RepoHandle, message: &str) -> Result<(), HarnessError> {
        self.run_expect_success(repo, &["commit", "-m", message])?;
        Ok(())
    }

    /// Set a local identity (`Local User <local@example.com>`), then
    /// create, stage, and commit `test.txt` as `"Test commit"`.
    ///
    /// Reusable after both `init` and `clone`.
    ///
    /// # Errors
    ///
    /// Propagates the first failing step.
    pub fn commit_file_with_local_identity(
        &self,
        repo: &RepoHandle,
    ) -> Result<PathBuf, HarnessError> {
        self.configure_local_identity(repo, "Local User", "local@example.com")?;
        let file = self.write_file(repo, "test.txt")?;
        self.stage(repo, "test.txt")?;
        self.commit(repo, "Test commit")?;
        info!(repo = %repo.path.display(), "created commit with local identity");
        Ok(file)
    }

    /// Add a remote by name and URL. The URL is not validated by the
    /// tool, so even an unreachable one is accepted here.
    ///
    /// # Errors
    ///
    /// Propagates launch failures and non-success classification.
    pub fn add_remote(&self, repo: &RepoHandle, name: &str, url: &str) -> Result<(), HarnessError> {
        self.run_expect_success(repo, &["remote", "add", name, url])?;
        Ok(())
    }

    /// Push `branch` to `remote`, setting the upstream.
    ///
    /// # Errors
    ///
    /// Propagates launch failures and non-success classification.
    pub fn push(&self, repo: &RepoHandle, remote: &str, branch: &str) -> Result<(), HarnessError> {
        self.run_expect_success(repo, &["push", "-u", remote, branch])?;
        Ok(())
    }

    /// Pull from the configured upstream.
    ///
    /// # Errors
    ///
    /// Propagates launch failures and non-success classification.
    pub fn pull(&self, repo: &RepoHandle) -> Result<(), HarnessError> {
        self.run_expect_success(repo, &["pull"])?;
        Ok(())
    }

    /// Clone `remote` into a fresh, uniquely named client directory,
    /// with the default branch pinned to `main` first.
    ///
    /// Not memoized: every call yields an independent client, so tests
    /// can stand up several clients against the same remote.
    ///
    /// # Errors
    ///
    /// Propagates the first failing step.
    pub fn clone_repo(&self, remote: &RepoHandle) -> Result<RepoHandle, HarnessError> {
        self.set_global_config("init.defaultBranch", DEFAULT_BRANCH)?;
        let parent = self.fresh_dir("client")?;
        let remote_url = remote.path.to_string_lossy();
        let result = self.run_in(&parent, &["clone", &remote_url, "clone"])?;
        classify(&result, ExpectationMode::ExpectSuccess, &self.signatures)?;
        let repo = RepoHandle {
            path: parent.join("clone"),
            kind: RepoKind::NonBare,
        };
        info!(
            remote = %remote.path.display(),
            client = %repo.path.display(),
            "cloned remote repository"
        );
        Ok(repo)
    }

    /// Current HEAD commit id of the repository.
    ///
    /// # Errors
    ///
    /// Propagates launch failures and non-success classification (e.g.
    /// when no commit exists yet).
    pub fn rev_parse_head(&self, repo: &RepoHandle) -> Result<String, HarnessError> {
        let result = self.run_expect_success(repo, &["rev-parse", "HEAD"])?;
        Ok(result.stdout.trim().to_string())
    }

    /// `log -1` output for the latest commit.
    ///
    /// # Errors
    ///
    /// Propagates launch failures and non-success classification.
    pub fn latest_log(&self, repo: &RepoHandle) -> Result<String, HarnessError> {
        Ok(self.run_expect_success(repo, &["log", "-1"])?.stdout)
    }

    /// Resolve a scenario node, building its prerequisites first.
    ///
    /// Each node is built at most once per scenario; later requests
    /// return the memoized handle. If any prerequisite step fails
    /// classification, construction aborts and the error propagates —
    /// dependents are never invoked on partial state.
    ///
    /// # Errors
    ///
    /// Propagates the first failing build step.
    pub fn resolve(&self, node: Node) -> Result<RepoHandle, HarnessError> {
        if let Some(repo) = self.built.borrow().get(&node) {
            return Ok(repo.clone());
        }
        info!(?node, "building scenario node");
        let repo = match node {
            Node::BareRemote => self.build_bare_remote(),
            Node::LocalInit => self.build_local_init(),
            Node::LocalWithIdentity => self.build_local_with_identity(),
            Node::StagedFile => self.build_staged_file(),
            Node::Commit => self.build_commit(),
            Node::Cloned => self.build_cloned(),
            Node::RemoteConfigured => self.build_remote_configured(),
            Node::Pushed => self.build_pushed(),
            Node::Pulled => self.build_pulled(),
        }?;
        self.built.borrow_mut().insert(node, repo.clone());
        Ok(repo)
    }

    fn build_bare_remote(&self) -> Result<RepoHandle, HarnessError> {
        let dir = self.fresh_dir("remote")?;
        let path = dir.join("remote-repo.git");
        fs::create_dir(&path)?;
        let repo = RepoHandle {
            path,
            kind: RepoKind::Bare,
        };
        self.run_expect_success(&repo, &["init", "--bare"])?;
        // Without this the bare repo advertises the tool's built-in
        // default branch to clients.
        let head_ref = format!("refs/heads/{DEFAULT_BRANCH}");
        self.run_expect_success(&repo, &["symbolic-ref", "HEAD", &head_ref])?;
        let head = fs::read_to_string(repo.path.join("HEAD"))?;
        if head.trim() != format!("ref: {head_ref}") {
            return Err(HarnessError::Structural {
                root: repo.path.clone(),
                problem: format!(
                    "bare remote HEAD should point at {DEFAULT_BRANCH}, got: {}",
                    head.trim()
                ),
            });
        }
        info!(path = %repo.path.display(), "created bare remote repository");
        Ok(repo)
    }

    fn build_local_init(&self) -> Result<RepoHandle, HarnessError> {
        self.set_global_config("init.defaultBranch", DEFAULT_BRANCH)?;
        let path = self.fresh_dir("repo")?;
        let repo = RepoHandle {
            path,
            kind: RepoKind::NonBare,
        };
        self.run_expect_success(&repo, &["init"])?;
        Ok(repo)
    }

    fn build_local_with_identity(&self) -> Result<RepoHandle, HarnessError> {
        let repo = self.resolve(Node::LocalInit)?;
        self.configure_global_identity("Test User", "test@example.com")?;
        Ok(repo)
    }

    fn build_staged_file(&self) -> Result<RepoHandle, HarnessError> {
        let repo = self.resolve(Node::LocalWithIdentity)?;
        self.write_file(&repo, "file.txt")?;
        self.stage(&repo, "file.txt")?;
        debug!(repo = %repo.path.display(), "staged file.txt");
        Ok(repo)
    }

    fn build_commit(&self) -> Result<RepoHandle, HarnessError> {
        let repo = self.resolve(Node::StagedFile)?;
        self.commit(&repo, "Initial commit")?;
        Ok(repo)
    }

    fn build_cloned(&self) -> Result<RepoHandle, HarnessError> {
        let remote = self.resolve(Node::BareRemote)?;
        let repo = self.clone_repo(&remote)?;
        self.commit_file_with_local_identity(&repo)?;
        Ok(repo)
    }

    fn build_remote_configured(&self) -> Result<RepoHandle, HarnessError> {
        let remote = self.resolve(Node::BareRemote)?;
        let repo = self.resolve(Node::Commit)?;
        let url = remote.path.to_string_lossy();
        self.add_remote(&repo, DEFAULT_REMOTE, &url)?;
        Ok(repo)
    }

    fn build_pushed(&self) -> Result<RepoHandle, HarnessError> {
        let repo = self.resolve(Node::RemoteConfigured)?;
        self.push(&repo, DEFAULT_REMOTE, DEFAULT_BRANCH)?;
        Ok(repo)
    }

    fn build_pulled(&self) -> Result<RepoHandle, HarnessError> {
        // The second client clones before the first client's push so the
        // pull is a real fast-forward.
        let remote = self.resolve(Node::BareRemote)?;
        let puller = self.clone_repo(&remote)?;
        self.resolve(Node::Pushed)?;
        self.pull(&puller)?;
        Ok(puller)
    }
}

impl Drop for Scenario {
    /// Finalizers for global mutations run unconditionally, newest first,
    /// before the scenario's temporary subtree is removed. Failures are
    /// logged, never raised.
    fn drop(&mut self) {
        let finalizers = std::mem::take(self.finalizers.get_mut());
        for finalizer in finalizers.into_iter().rev() {
            let args: Vec<&str> = finalizer.command.iter().map(String::as_str).collect();
            match self.run_in(self.root.path(), &args) {
                Ok(result) if result.exit_code != 0 => {
                    warn!(
                        finalizer = %finalizer.description,
                        exit_code = result.exit_code,
                        stderr = %result.stderr.trim(),
                        "finalizer command failed"
                    );
                }
                Ok(_) => debug!(finalizer = %finalizer.description, "finalizer ran"),
                Err(err) => {
                    warn!(finalizer = %finalizer.description, %err, "finalizer could not run");
                }
            }
        }
    }
}
