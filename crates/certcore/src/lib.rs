//! Workflow graph model for certificate pipelines
//!
//! This crate provides the node type registry, the copy-on-write workflow
//! tree with its structural edits and validation, and the store holding
//! the tree being edited. It has no network dependencies.

mod document;
mod error;
mod graph;
mod node;
pub mod registry;
mod store;
mod validate;

pub use error::{Error, GraphError, Violation};
pub use graph::{BranchInsertion, WorkflowGraph};
pub use node::{create_node, Iter, NodeConfig, NodeId, NodeOptions, WorkflowNode};
pub use registry::{catalog, CatalogEntry, NodeKind, ProviderInfo};
pub use store::{GraphSnapshot, GraphStore};
pub use validate::validate;

/// Result type for workflow graph operations
pub type Result<T> = std::result::Result<T, Error>;
