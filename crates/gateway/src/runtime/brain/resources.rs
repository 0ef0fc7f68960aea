//! Resources capability (spec §4.B, §6) — the read-only key→blob
//! accessor handed to actions via `StepContext::resources`.
//!
//! Backed by `sa_skills::SkillsRegistry`'s existing file-resource
//! reader: a key is `"{skill_name}/{relative_path}"`, split on the
//! first `/` and handed to `read_resource`, which already enforces the
//! `references/`/`scripts/`/`assets/` subdir allowlist and blocks path
//! traversal.

use std::sync::Arc;

use sa_domain::brain::Resources;
use sa_skills::registry::SkillsRegistry;

pub struct SkillsResources {
    registry: Arc<SkillsRegistry>,
}

impl SkillsResources {
    pub fn new(registry: Arc<SkillsRegistry>) -> Self {
        Self { registry }
    }
}

impl Resources for SkillsResources {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let (skill_name, relative_path) = key.split_once('/')?;
        self.registry
            .read_resource(skill_name, relative_path)
            .ok()
            .map(String::into_bytes)
    }
}
