//! Remote operations against a bare repository: clone, push, pull.

use std::fs;

use anyhow::ensure;
use git_harness::{Node, validate_repository_layout};

use super::common;

#[test]
fn clone_from_bare_remote_has_valid_layout() -> anyhow::Result<()> {
    let Some(scenario) = common::scenario()? else {
        return Ok(());
    };
    let remote = scenario.resolve(Node::BareRemote)?;
    validate_repository_layout(&remote.metadata_dir())?;

    let clone = scenario.clone_repo(&remote)?;
    validate_repository_layout(&clone.metadata_dir())?;
    Ok(())
}

#[test]
fn remote_add_writes_url_to_config() -> anyhow::Result<()> {
    let Some(scenario) = common::scenario()? else {
        return Ok(());
    };
    let remote = scenario.resolve(Node::BareRemote)?;
    let repo = scenario.resolve(Node::LocalInit)?;
    let url = remote.path.to_string_lossy().into_owned();
    scenario.add_remote(&repo, "origin", &url)?;

    let config = fs::read_to_string(repo.metadata_dir().join("config"))?;
    ensure!(
        config.contains("[remote \"origin\"]"),
        "remote section not found in config:\n{config}"
    );
    ensure!(
        config.contains(&url),
        "remote url not found in config:\n{config}"
    );
    Ok(())
}

#[test]
fn push_publishes_head_to_bare_remote() -> anyhow::Result<()> {
    let Some(scenario) = common::scenario()? else {
        return Ok(());
    };
    let pusher = scenario.resolve(Node::Pushed)?;
    let remote = scenario.resolve(Node::BareRemote)?;

    let local_id = scenario.rev_parse_head(&pusher)?;
    let remote_ref = remote.path.join("refs").join("heads").join("main");
    ensure!(
        remote_ref.is_file(),
        "refs/heads/main not found on remote after push"
    );
    let remote_id = fs::read_to_string(&remote_ref)?;
    ensure!(
        remote_id.trim() == local_id,
        "remote head {} does not match local head {local_id}",
        remote_id.trim()
    );
    Ok(())
}

#[test]
fn pull_fast_forwards_second_client() -> anyhow::Result<()> {
    let Some(scenario) = common::scenario()? else {
        return Ok(());
    };
    // Pulled clones before the push happens, then pulls it in.
    let puller = scenario.resolve(Node::Pulled)?;
    let pusher = scenario.resolve(Node::Pushed)?;

    let pushed_id = scenario.rev_parse_head(&pusher)?;
    let pulled_id = scenario.rev_parse_head(&puller)?;
    ensure!(pushed_id.len() == 40, "unexpected commit id: {pushed_id}");
    ensure!(
        pulled_id == pushed_id,
        "second client did not receive the pushed commit: {pulled_id} vs {pushed_id}"
    );
    Ok(())
}

#[test]
fn second_clone_sees_pushed_commit() -> anyhow::Result<()> {
    let Some(scenario) = common::scenario()? else {
        return Ok(());
    };
    // Client 1 clones, commits, and pushes.
    let remote = scenario.resolve(Node::BareRemote)?;
    let client1 = scenario.resolve(Node::Cloned)?;
    scenario.push(&client1, "origin", "main")?;

    // Client 2 clones after the push.
    let client2 = scenario.clone_repo(&remote)?;

    let id1 = scenario.rev_parse_head(&client1)?;
    let id2 = scenario.rev_parse_head(&client2)?;
    ensure!(
        id1 == id2,
        "clients diverged after clone: {id1} vs {id2}"
    );
    Ok(())
}
