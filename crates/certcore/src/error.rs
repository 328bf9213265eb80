use crate::{NodeId, NodeKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Workflow is invalid: {} violation(s)", .0.len())]
    Invalid(Vec<Violation>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures raised synchronously by structural edits. The graph the
/// operation was called on is never modified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Node type '{0}' requires a provider")]
    MissingProvider(NodeKind),

    #[error("Node type '{kind}' does not take a provider, got '{provider}'")]
    UnexpectedProvider { kind: NodeKind, provider: String },

    #[error("Unknown provider '{provider}' for node type '{kind}'")]
    UnknownProvider { kind: NodeKind, provider: String },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("The start node cannot be removed")]
    CannotRemoveRoot,

    #[error("Branch {branch_id} must keep at least 2 chains (has {chains})")]
    BranchArityViolation { branch_id: NodeId, chains: usize },

    #[error("A branch needs at least 2 chains, got {0}")]
    InvalidChainCount(usize),

    #[error("Node {0} is not a branch")]
    NotABranch(NodeId),

    #[error("Branch {branch_id} has no chain at index {index}")]
    ChainIndexOutOfRange { branch_id: NodeId, index: usize },

    #[error("Nodes of type '{0}' cannot be inserted into a chain")]
    InvalidPlacement(NodeKind),

    #[error("Node id {0} already exists in the workflow")]
    DuplicateNodeId(NodeId),
}

/// A broken invariant reported by [`crate::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("Root node {id} is a '{kind}' node, expected 'start'")]
    RootNotStart { id: NodeId, kind: NodeKind },

    #[error("Start node {id} appears below the root")]
    MisplacedStart { id: NodeId },

    #[error("Node {id} has {count} predecessors, expected {expected}")]
    PredecessorCount {
        id: NodeId,
        count: usize,
        expected: usize,
    },

    #[error("Branch {id} has {chains} chain(s), expected at least 2")]
    BranchArity { id: NodeId, chains: usize },

    #[error("Chain {index} of branch {branch_id} starts with a '{kind}' node")]
    ChainHeadNotCondition {
        branch_id: NodeId,
        index: usize,
        kind: NodeKind,
    },

    #[error("Condition node {id} is not the head of a branch chain")]
    MisplacedCondition { id: NodeId },

    #[error("Node {id} of type '{kind}' holds chains but is not a container")]
    UnexpectedChains { id: NodeId, kind: NodeKind },

    #[error("Node {id} of type '{kind}' has no provider")]
    MissingProvider { id: NodeId, kind: NodeKind },

    #[error("Node {id} of type '{kind}' must not have provider '{provider}'")]
    UnexpectedProvider {
        id: NodeId,
        kind: NodeKind,
        provider: String,
    },

    #[error("Node {id} of type '{kind}' has unknown provider '{provider}'")]
    UnknownProvider {
        id: NodeId,
        kind: NodeKind,
        provider: String,
    },

    #[error("Node id {id} is used {occurrences} times")]
    DuplicateId { id: NodeId, occurrences: usize },
}
