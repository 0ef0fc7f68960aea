//! Pages Service (spec §6) — a minimal collaborator for `Wait`/`Step`
//! actions that hand a run off to a human-facing UI page.
//!
//! Concrete page hosting/rendering is out of scope (spec.md §1); this
//! only tracks page rows and their associated webhook registration so
//! a `WaitAction` closure has something real to call. The page's
//! `webhook` (if present) is what the block threads into
//! `StepOutcome::Wait`, which the Runner turns into a Monitor waiter
//! (spec §4.G).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sa_domain::error::{Error, Result};
use sa_domain::event::WebhookRegistration;
use serde_json::Value;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Page {
    pub id: String,
    pub run_id: String,
    pub data: Value,
    pub webhook: Option<WebhookRegistration>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory page store, optionally persisted to `state_dir/pages.json`
/// the same way `ScheduleStore` persists its tables.
pub struct PagesService {
    pages: RwLock<HashMap<String, Page>>,
    state_path: Option<std::path::PathBuf>,
}

impl PagesService {
    pub fn new() -> Self {
        Self { pages: RwLock::new(HashMap::new()), state_path: None }
    }

    /// Load (if present) and persist pages under `state_dir/pages.json`.
    pub fn with_state_dir(state_dir: &std::path::Path) -> Self {
        let path = state_dir.join("pages.json");
        let pages = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<Vec<Page>>(&s).ok())
            .map(|v| v.into_iter().map(|p| (p.id.clone(), p)).collect())
            .unwrap_or_default();
        Self { pages: RwLock::new(pages), state_path: Some(path) }
    }

    fn persist(&self) {
        let Some(path) = &self.state_path else { return };
        let values: Vec<Page> = self.pages.read().values().cloned().collect();
        if let Ok(json) = serde_json::to_string_pretty(&values) {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(path, json) {
                tracing::warn!(error = %e, "failed to persist pages");
            }
        }
    }

    pub fn create(&self, run_id: &str, data: Value, webhook: Option<WebhookRegistration>) -> Page {
        let now = Utc::now();
        let page = Page {
            id: format!("page_{}", uuid::Uuid::new_v4()),
            run_id: run_id.to_string(),
            data,
            webhook,
            created_at: now,
            updated_at: now,
        };
        self.pages.write().insert(page.id.clone(), page.clone());
        self.persist();
        page
    }

    pub fn get(&self, id: &str) -> Result<Page> {
        self.pages
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Other(format!("page not found: {id}")))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.pages.read().contains_key(id)
    }

    pub fn update(&self, id: &str, data: Value) -> Result<Page> {
        let mut pages = self.pages.write();
        let page = pages
            .get_mut(id)
            .ok_or_else(|| Error::Other(format!("page not found: {id}")))?;
        page.data = data;
        page.updated_at = Utc::now();
        let updated = page.clone();
        drop(pages);
        self.persist();
        Ok(updated)
    }
}

impl Default for PagesService {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedPagesService = Arc<PagesService>;
