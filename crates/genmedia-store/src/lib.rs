pub mod artifacts;
pub mod db;
pub mod workflows;

pub use artifacts::SqliteArtifactStore;
pub use db::Database;
pub use workflows::SqliteWorkflowRepository;
