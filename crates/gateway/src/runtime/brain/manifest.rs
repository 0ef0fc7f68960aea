//! Brain manifest — resolves a `brain_title` to its compiled IR.
//!
//! Brains are native Rust pipelines (their `Step`/`Guard`/... closures
//! aren't serializable), so the executable `Brain` itself is always
//! populated by in-process registration at startup — the lookup
//! contract (name in, closed error on miss) is the same shape as
//! `SkillsRegistry::read_doc`. What *can* come from disk is metadata:
//! `.brain.toml` files under `config.brains.manifest_dir` declaring a
//! title/description/tag set, following the same scan-a-directory
//! pattern as `SkillsRegistry`/`WorkspaceReader`. [`Manifest`] merges
//! that discovered metadata with the in-process registry so `list()`/
//! `search()` can enumerate brains without the caller needing to know
//! which ones happen to carry a manifest file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use sa_domain::brain::Brain;
use sa_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Seam the Runner and Scheduler resolve brains through, so callers
/// don't need to depend on the concrete registry type.
pub trait BrainManifest: Send + Sync {
    fn resolve(&self, title: &str) -> Option<Arc<Brain>>;
}

/// In-memory brain registry: `brain_title -> Brain` populated once at
/// boot from the process's native brain definitions.
pub struct InMemoryManifest {
    brains: RwLock<HashMap<String, Arc<Brain>>>,
}

impl InMemoryManifest {
    pub fn new() -> Self {
        Self { brains: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, brain: Brain) {
        self.brains.write().insert(brain.title.clone(), Arc::new(brain));
    }

    pub fn get(&self, title: &str) -> Result<Arc<Brain>, Error> {
        self.brains
            .read()
            .get(title)
            .cloned()
            .ok_or_else(|| Error::UnknownBrain(title.to_string()))
    }

    pub fn titles(&self) -> Vec<String> {
        self.brains.read().keys().cloned().collect()
    }
}

impl Default for InMemoryManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl BrainManifest for InMemoryManifest {
    fn resolve(&self, title: &str) -> Option<Arc<Brain>> {
        self.brains.read().get(title).cloned()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-discovered metadata
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A `.brain.toml` manifest file's declared metadata, merged onto a
/// native registration of the same title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFile {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Listing entry combining file-sourced metadata with registration
/// status (whether a native `Brain` backs this title yet).
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub registered: bool,
}

/// Resolves `brain_title -> Brain` through native registration (the
/// closures can't round-trip through a file), while discovering
/// `.brain.toml` metadata files under `manifest_dir` for listing and
/// search (spec §6).
pub struct Manifest {
    inner: InMemoryManifest,
    manifest_dir: PathBuf,
    files: RwLock<HashMap<String, ManifestFile>>,
}

impl Manifest {
    pub fn new(manifest_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: InMemoryManifest::new(),
            manifest_dir: manifest_dir.into(),
            files: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, brain: Brain) {
        self.inner.register(brain);
    }

    pub fn get(&self, title: &str) -> Result<Arc<Brain>> {
        self.inner.get(title)
    }

    /// Scan `manifest_dir` for `*.brain.toml` files and load their
    /// metadata. Missing directory is not an error — it just yields no
    /// file-sourced entries (native-only brains still resolve/list).
    pub fn scan(&self) -> Result<usize> {
        let mut files = self.files.write();
        files.clear();
        let dir = &self.manifest_dir;
        if !dir.is_dir() {
            return Ok(0);
        }
        let pattern = dir.join("*.brain.toml");
        let pattern = pattern.to_string_lossy();
        let mut count = 0;
        for entry in glob::glob(&pattern)
            .map_err(|e| Error::Config(format!("bad manifest_dir glob: {e}")))?
            .flatten()
        {
            count += load_manifest_file(&entry, &mut files)?;
        }
        Ok(count)
    }

    pub fn list(&self) -> Vec<ManifestEntry> {
        let files = self.files.read();
        let registered = self.inner.titles();
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let mut entries: Vec<ManifestEntry> = files
            .values()
            .map(|f| {
                seen.insert(&f.title);
                ManifestEntry {
                    title: f.title.clone(),
                    description: f.description.clone(),
                    tags: f.tags.clone(),
                    registered: registered.iter().any(|t| t == &f.title),
                }
            })
            .collect();
        for title in &registered {
            if !seen.contains(title.as_str()) {
                entries.push(ManifestEntry {
                    title: title.clone(),
                    description: String::new(),
                    tags: Vec::new(),
                    registered: true,
                });
            }
        }
        entries.sort_by(|a, b| a.title.cmp(&b.title));
        entries
    }

    /// Case-insensitive substring match over title/description/tags.
    pub fn search(&self, query: &str) -> Vec<ManifestEntry> {
        let q = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|e| {
                e.title.to_lowercase().contains(&q)
                    || e.description.to_lowercase().contains(&q)
                    || e.tags.iter().any(|t| t.to_lowercase().contains(&q))
            })
            .collect()
    }
}

impl BrainManifest for Manifest {
    fn resolve(&self, title: &str) -> Option<Arc<Brain>> {
        self.inner.resolve(title)
    }
}

fn load_manifest_file(path: &Path, files: &mut HashMap<String, ManifestFile>) -> Result<usize> {
    let raw = std::fs::read_to_string(path)?;
    let file: ManifestFile = toml::from_str(&raw)
        .map_err(|e| Error::Config(format!("invalid manifest {}: {e}", path.display())))?;
    files.insert(file.title.clone(), file);
    Ok(1)
}
