pub mod config;
pub mod error;
pub mod graph;
pub mod media;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{classify_provider_error, ErrorKind, GenmediaError, Result};
pub use graph::{Edge, Node, NodeData, WorkflowGraph};
pub use types::*;
