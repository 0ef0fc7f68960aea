//! The Brain execution engine (spec §4.F, §4.F.1, §6): the Durable
//! Runner, its Agent sub-loop, the LLM capability seam, and the
//! manifest that resolves a `brain_title` to compiled IR.

pub mod agent_loop;
pub mod client;
pub mod manifest;
pub mod pages;
pub mod resources;
pub mod runner;

pub use client::{
    GenerateObjectRequest, GenerateTextRequest, GenerateTextResult, ObjectGenerator,
    RouterObjectGenerator,
};
pub use manifest::{BrainManifest, InMemoryManifest, Manifest, ManifestEntry};
pub use pages::{Page, PagesService};
pub use resources::SkillsResources;
pub use runner::{Runner, RunnerStarter};
