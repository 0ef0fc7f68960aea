//! `AppState` construction, config validation, and background-task
//! spawning extracted from `main.rs` — the shared "boot" path used by
//! `serve`, `run`, and `doctor` (spec §6, SPEC_FULL §4.L).

use std::path::PathBuf;
use std::sync::Arc;

use sa_domain::config::{Config, ConfigSeverity};

use crate::state::AppState;

/// Validate config and construct a fully-wired [`AppState`].
pub fn build_app_state(config: Arc<Config>, config_path: String) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let state = AppState::build(config, PathBuf::from(config_path))?;
    tracing::info!("brain engine runtime ready");
    Ok(state)
}

/// Spawn the scheduler's persistent tick loop (spec §4.H step 4: "re-arm
/// alarm for now+60s ... rearm must be unconditional"). Call after
/// [`build_app_state`] when running the HTTP server; the one-shot `run`
/// CLI path skips this since it drives a single run directly.
pub fn spawn_background_tasks(state: &AppState) {
    let scheduler = state.scheduler.clone();
    let tick_interval = std::time::Duration::from_secs(state.config.scheduler.tick_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            interval.tick().await;
            scheduler.tick().await;
        }
    });
    tracing::info!(tick_interval_secs = state.config.scheduler.tick_interval_secs, "scheduler tick loop armed");
}
