//! Workflow graph handling.
//!
//! Nodes reference stored artifacts by id under a small set of data keys.
//! The `GraphResolver` scans those keys, resolves each distinct id once, and
//! returns a copy of the graph with a locator and an existence flag beside
//! every reference. `WorkflowService` is the CRUD layer that calls it.

pub mod convention;
pub mod resolver;
pub mod service;

pub use convention::ReferenceConvention;
pub use resolver::GraphResolver;
pub use service::WorkflowService;
