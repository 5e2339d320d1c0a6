pub mod images;
pub mod job;
pub mod orchestrator;
pub mod payload;

pub use images::ImageService;
pub use job::{JobHandle, Persistence};
pub use orchestrator::JobOrchestrator;
pub use payload::interpret_poll;
