//! Shared helpers for the harness integration tests.

use std::sync::Once;

use git_harness::Scenario;

static INIT: Once = Once::new();

/// Install the tracing subscriber once for the whole test binary.
/// `RUST_LOG=git_harness=debug` shows the full command trace.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// True when a `git` binary is available on PATH.
pub fn git_available() -> bool {
    which::which("git").is_ok()
}

/// Standard per-test setup: logging plus a fresh scenario, or `None`
/// when no `git` binary is available.
pub fn scenario() -> anyhow::Result<Option<Scenario>> {
    init_logging();
    if !git_available() {
        return Ok(None);
    }
    Ok(Some(Scenario::new()?))
}
