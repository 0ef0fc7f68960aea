//! Shared application state handed to every HTTP handler and CLI path.
//!
//! Generalizes the teacher's flat `AppState` (one struct holding every
//! subsystem `Arc`, `Clone`d per-request by axum) down to exactly the
//! collaborators the Brain Execution Engine needs (spec §2, §6).

use std::path::PathBuf;
use std::sync::Arc;

use sa_domain::config::Config;
use sa_providers::router::LlmRouter;

use crate::runtime::brain::{Manifest, ObjectGenerator, PagesService, RouterObjectGenerator, Runner, SkillsResources};
use crate::runtime::monitor::Monitor;
use crate::runtime::run_lock::RunLockMap;
use crate::runtime::schedule_runner::Scheduler;
use crate::runtime::schedules::store::ScheduleStore;
use crate::runtime::signals::SignalQueues;
use crate::runtime::webhooks::WebhookRouter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub config_path: PathBuf,

    /// `ObjectGenerator` capability (spec §6), backed by the LLM router.
    pub llm: Arc<dyn ObjectGenerator>,

    /// Event Log & Monitor (spec §4.D).
    pub monitor: Arc<Monitor>,
    /// Signal Queue (spec §4.E).
    pub signals: Arc<SignalQueues>,
    /// Per-run single-writer lock (spec §5, I-4).
    pub locks: Arc<RunLockMap>,
    /// Brain Manifest (spec §6).
    pub manifest: Arc<Manifest>,
    /// Pages Service collaborator (spec §6).
    pub pages: Arc<PagesService>,
    /// The Durable Runner (spec §4.F).
    pub runner: Arc<Runner>,

    /// Scheduler tables (spec §3, §4.H).
    pub schedule_store: Arc<ScheduleStore>,
    /// Scheduler actor (spec §4.H).
    pub scheduler: Arc<Scheduler>,

    /// Webhook Router (spec §4.G).
    pub webhook_router: Arc<WebhookRouter>,

    /// SHA-256 digest of the configured API bearer token, `None` in dev
    /// mode (no token configured) — see `api::auth::require_api_token`.
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    /// Construct every subsystem from `config` and wire them together.
    /// Shared by `serve`, `run`, and `doctor` (spec.md §6's CLI surface).
    pub fn build(config: Arc<Config>, config_path: PathBuf) -> anyhow::Result<Self> {
        let monitor = Arc::new(Monitor::new(
            &config.workspace.state_path.join(&config.monitor.state_dir),
            config.monitor.max_runs_in_memory,
            config.monitor.broadcast_capacity,
        ));
        let signals = Arc::new(SignalQueues::new());
        let locks = Arc::new(RunLockMap::new());
        let manifest = Arc::new(Manifest::new(config.brains.manifest_dir.clone()));
        let loaded = manifest.scan()?;
        tracing::info!(manifest_entries = loaded, dir = %config.brains.manifest_dir, "brain manifest scanned");

        let llm_router = Arc::new(LlmRouter::from_config(&config.llm)?);
        let llm: Arc<dyn ObjectGenerator> = Arc::new(RouterObjectGenerator::new(llm_router));

        let pages = Arc::new(PagesService::with_state_dir(&config.workspace.state_path));

        let skills_registry = match sa_skills::registry::SkillsRegistry::load(&config.skills.path) {
            Ok(registry) => Arc::new(registry),
            Err(e) => {
                tracing::warn!(error = %e, dir = %config.skills.path.display(), "skills registry load failed, resources capability disabled");
                Arc::new(sa_skills::registry::SkillsRegistry::empty())
            }
        };
        let resources: sa_domain::brain::SharedResources = Arc::new(SkillsResources::new(skills_registry));

        let runner = Arc::new(Runner::new(monitor.clone(), signals.clone(), locks.clone(), llm.clone(), resources));

        let schedule_store = Arc::new(ScheduleStore::new(&config.workspace.state_path));
        let starter = Arc::new(crate::runtime::brain::runner::RunnerStarter {
            runner: runner.clone(),
            manifest: manifest.clone(),
        });
        let scheduler = Arc::new(Scheduler::new(schedule_store.clone(), starter));

        let webhook_router = Arc::new(WebhookRouter::new(
            monitor.clone(),
            signals.clone(),
            config.webhooks.warn_on_missing_token,
        ));

        let api_token_hash = read_bearer_token_hash("SA_API_TOKEN");

        Ok(Self {
            config,
            config_path,
            llm,
            monitor,
            signals,
            locks,
            manifest,
            pages,
            runner,
            schedule_store,
            scheduler,
            webhook_router,
            api_token_hash,
        })
    }
}

/// Read `env_var` once at startup and cache its SHA-256 digest, the
/// same pattern `api::auth::require_api_token` expects (spec §6: dev
/// mode, a missing token, is a logged warning, not a hard failure).
fn read_bearer_token_hash(env_var: &str) -> Option<Vec<u8>> {
    use sha2::{Digest, Sha256};
    match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
        Some(token) => {
            tracing::info!(env_var, "API bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        None => {
            tracing::warn!(env_var, "API bearer-token auth DISABLED (dev mode)");
            None
        }
    }
}
