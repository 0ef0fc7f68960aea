//! `serialagent run` — one-shot brain execution command.
//!
//! Starts a brain run through the same `Runner` the HTTP API uses, but
//! drives it to completion synchronously and dumps its event log to
//! stdout instead of returning a `brainRunId` for polling.

use std::sync::Arc;

use serde_json::Value;

use sa_domain::config::Config;
use sa_domain::state_machine::RunState;

use crate::state::AppState;

/// Execute a brain run to completion and print its event log.
///
/// This is the entry point for `serialagent run <brain_title>`.
pub async fn run(
    config: Arc<Config>,
    config_path: String,
    brain_title: String,
    options: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState::build(config, config_path.into())?;

    let options: Value = match options {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing --options as JSON: {e}"))?,
        None => Value::Object(Default::default()),
    };

    let Some(brain) = state.manifest.resolve(&brain_title) else {
        anyhow::bail!("unknown brain: {brain_title}");
    };

    let run_id = format!("run_{}", uuid::Uuid::new_v4());
    println!("starting run {run_id} ({brain_title})");

    let result = state.runner.start(&run_id, &brain, options, Value::Null).await;

    for event in state.monitor.events(&run_id, None) {
        println!("{}", serde_json::to_string(&event)?);
    }

    let exit_code = match (&result, state.monitor.get(&run_id)) {
        (Ok(_), Some(run)) => {
            let status = run.public_status();
            println!("run {run_id} finished: {status:?}");
            if status == RunState::Error {
                1
            } else {
                0
            }
        }
        (Err(e), _) => {
            eprintln!("run {run_id} failed: {e}");
            1
        }
        (Ok(_), None) => 0,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
