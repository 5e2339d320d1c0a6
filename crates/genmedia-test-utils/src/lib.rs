//! Mocks and fixtures shared by the genmedia crates' tests.

pub mod fixtures;
pub mod provider;
pub mod store;
pub mod workflows;

pub use fixtures::*;
pub use provider::{png_image, ScriptedProvider};
pub use store::MemoryArtifactStore;
pub use workflows::MemoryWorkflowRepository;
