//! Identity and default-branch configuration behavior.

use std::fs;

use anyhow::ensure;
use git_harness::{Node, Scenario};

use super::common;

#[test]
fn config_writes_identity_to_repo_config() -> anyhow::Result<()> {
    let Some(scenario) = common::scenario()? else {
        return Ok(());
    };
    let repo = scenario.resolve(Node::LocalInit)?;
    scenario.configure_local_identity(&repo, "Test User", "test@example.com")?;

    let config = fs::read_to_string(repo.metadata_dir().join("config"))?;
    ensure!(
        config.contains("name = Test User"),
        "user.name not found in config:\n{config}"
    );
    ensure!(
        config.contains("email = test@example.com"),
        "user.email not found in config:\n{config}"
    );
    Ok(())
}

#[test]
fn default_branch_setting_controls_fresh_head() -> anyhow::Result<()> {
    let Some(scenario) = common::scenario()? else {
        return Ok(());
    };
    let repo = scenario.resolve(Node::LocalInit)?;
    let head = fs::read_to_string(repo.metadata_dir().join("HEAD"))?;
    ensure!(
        head.trim() == "ref: refs/heads/main",
        "expected HEAD to point at main, got: {}",
        head.trim()
    );
    Ok(())
}

#[test]
fn local_identity_overrides_global() -> anyhow::Result<()> {
    let Some(scenario) = common::scenario()? else {
        return Ok(());
    };
    // Global identity first, then a repo whose commit uses a local one.
    scenario.configure_global_identity("Global User", "global@example.com")?;
    let repo = scenario.resolve(Node::LocalInit)?;
    scenario.commit_file_with_local_identity(&repo)?;

    let id = scenario.rev_parse_head(&repo)?;
    let result = scenario.run_expect_success(&repo, &["cat-file", "-p", &id])?;
    let author_line = result
        .stdout
        .lines()
        .find(|line| line.starts_with("author "))
        .unwrap_or("<not found>");
    ensure!(
        author_line.contains("Local User <local@example.com>"),
        "local identity did not win, author line: {author_line}"
    );
    ensure!(
        !author_line.contains("Global User"),
        "global identity leaked into commit author: {author_line}"
    );
    Ok(())
}

#[test]
fn global_key_rewrite_keeps_last_value_and_teardown_removes_it() -> anyhow::Result<()> {
    common::init_logging();
    if !common::git_available() {
        return Ok(());
    }

    // The config file outlives the scenario so post-teardown state is
    // observable.
    let keeper = tempfile::TempDir::new()?;
    let global_file = keeper.path().join("gitconfig.global");
    fs::write(&global_file, "")?;

    {
        let scenario = Scenario::new()?.with_global_config_file(&global_file);
        scenario.set_global_config("init.defaultBranch", "trunk")?;
        scenario.set_global_config("init.defaultBranch", "main")?;

        let result = scenario.run_in(
            scenario.root_path(),
            &["config", "--global", "--get", "init.defaultBranch"],
        )?;
        ensure!(
            result.stdout.trim() == "main",
            "expected last written value to win, got: {}",
            result.stdout.trim()
        );
    }

    let config = fs::read_to_string(&global_file)?;
    ensure!(
        !config.contains("defaultBranch"),
        "expected key removed after teardown, config:\n{config}"
    );
    Ok(())
}
