use crate::{GraphError, NodeKind};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

pub type NodeId = Uuid;

/// Opaque provider-shaped configuration. Its schema is owned by the form
/// that produced it and is never interpreted here.
pub type NodeConfig = serde_json::Map<String, serde_json::Value>;

/// A single node of a workflow tree.
///
/// Nodes are immutable once they are part of a [`crate::WorkflowGraph`]:
/// edits produce new nodes along the path to the edit point and share
/// everything else through `Arc`.
///
/// Chains can be arbitrarily long, so equality, `Debug` and drop never
/// recurse along `next`.
#[derive(Clone)]
pub struct WorkflowNode {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) name: String,
    pub(crate) provider_type: Option<String>,
    pub(crate) config: NodeConfig,
    pub(crate) next: Option<Arc<WorkflowNode>>,
    /// Chain heads of a container, each one a Condition node
    pub(crate) branches: Vec<Arc<WorkflowNode>>,
}

impl WorkflowNode {
    /// Fresh node with a new id and no provider, config or links
    pub(crate) fn bare(kind: NodeKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: kind.display_name().to_string(),
            provider_type: None,
            config: NodeConfig::new(),
            next: None,
            branches: Vec::new(),
        }
    }

    /// Empty branch chain: a lone Condition head
    pub(crate) fn empty_chain() -> Arc<Self> {
        Arc::new(Self::bare(NodeKind::Condition))
    }

    /// Build a node of a known kind, enforcing the provider rule up front
    pub fn create(kind: NodeKind, options: NodeOptions) -> Result<Self, GraphError> {
        check_provider(kind, options.provider_type.as_deref())?;

        let mut node = Self::bare(kind);
        node.provider_type = options.provider_type;
        node.config = options.config;
        if let Some(name) = options.name {
            node.name = name;
        }
        if kind.is_container() {
            node.branches = vec![Self::empty_chain(), Self::empty_chain()];
        }
        Ok(node)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider_type(&self) -> Option<&str> {
        self.provider_type.as_deref()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn next(&self) -> Option<&Arc<WorkflowNode>> {
        self.next.as_ref()
    }

    pub fn branches(&self) -> &[Arc<WorkflowNode>] {
        &self.branches
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Pre-order walk over this node, its chains and its successors
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// Same own fields and same shape of links, ignoring what they link to
    fn same_fields(&self, other: &WorkflowNode) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.name == other.name
            && self.provider_type == other.provider_type
            && self.config == other.config
            && self.next.is_some() == other.next.is_some()
            && self.branches.len() == other.branches.len()
    }
}

impl PartialEq for WorkflowNode {
    fn eq(&self, other: &Self) -> bool {
        // Pre-order plus the shape of every node pins down the whole tree.
        let mut left = self.iter();
        let mut right = other.iter();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if a.same_fields(b) => {}
                _ => return false,
            }
        }
    }
}

impl fmt::Debug for WorkflowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("provider_type", &self.provider_type)
            .field("config", &self.config)
            .field("next", &self.next.as_ref().map(|n| n.id))
            .field("branches", &self.branches.iter().map(|b| b.id).collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for WorkflowNode {
    fn drop(&mut self) {
        // Unlink uniquely owned descendants one by one instead of letting
        // each `Arc` drop its successor recursively.
        let mut stack: Vec<Arc<WorkflowNode>> = self.next.take().into_iter().collect();
        stack.append(&mut self.branches);
        while let Some(node) = stack.pop() {
            if let Ok(mut node) = Arc::try_unwrap(node) {
                stack.extend(node.next.take());
                stack.append(&mut node.branches);
            }
        }
    }
}

/// Pre-order iterator over a node and everything reachable from it
pub struct Iter<'a> {
    stack: Vec<&'a WorkflowNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a WorkflowNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Some(next) = &node.next {
            self.stack.push(next);
        }
        self.stack.extend(node.branches.iter().rev().map(|b| b.as_ref()));
        Some(node)
    }
}

/// Optional inputs to [`create_node`]
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub provider_type: Option<String>,
    pub name: Option<String>,
    pub config: NodeConfig,
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider_type: impl Into<String>) -> Self {
        self.provider_type = Some(provider_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }
}

/// Create a node from an untyped type name, as picked from the catalog
pub fn create_node(node_type: &str, options: NodeOptions) -> Result<WorkflowNode, GraphError> {
    let kind = NodeKind::from_str(node_type)
        .map_err(|_| GraphError::InvalidNodeType(node_type.to_string()))?;
    WorkflowNode::create(kind, options)
}

/// A provider is present iff the kind requires one, and must be listed
/// for that kind.
pub(crate) fn check_provider(kind: NodeKind, provider: Option<&str>) -> Result<(), GraphError> {
    match provider {
        None if kind.requires_provider() => Err(GraphError::MissingProvider(kind)),
        None => Ok(()),
        Some(p) if !kind.requires_provider() => Err(GraphError::UnexpectedProvider {
            kind,
            provider: p.to_string(),
        }),
        Some(p) if kind.find_provider(p).is_none() => Err(GraphError::UnknownProvider {
            kind,
            provider: p.to_string(),
        }),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_create_node_enforces_provider_rule() {
        let err = create_node("deploy", NodeOptions::new()).unwrap_err();
        assert_eq!(err, GraphError::MissingProvider(NodeKind::Deploy));

        let err = create_node("notify", NodeOptions::new().with_provider("ssh")).unwrap_err();
        assert!(matches!(err, GraphError::UnexpectedProvider { .. }));

        let err = create_node("deploy", NodeOptions::new().with_provider("ftp")).unwrap_err();
        assert!(matches!(err, GraphError::UnknownProvider { .. }));

        let err = create_node("renew", NodeOptions::new()).unwrap_err();
        assert_eq!(err, GraphError::InvalidNodeType("renew".to_string()));
    }

    #[test]
    fn test_every_registry_combination_satisfies_provider_rule() {
        for kind in NodeKind::iter() {
            if kind.requires_provider() {
                for info in kind.providers() {
                    let node = WorkflowNode::create(kind, NodeOptions::new().with_provider(info.key))
                        .unwrap();
                    assert_eq!(node.provider_type(), Some(info.key));
                }
            } else {
                let node = WorkflowNode::create(kind, NodeOptions::new()).unwrap();
                assert!(node.provider_type().is_none());
            }
        }
    }

    #[test]
    fn test_branch_starts_with_two_empty_chains() {
        let branch = create_node("branch", NodeOptions::new()).unwrap();
        assert_eq!(branch.branches().len(), 2);
        for chain in branch.branches() {
            assert_eq!(chain.kind(), NodeKind::Condition);
            assert!(chain.next().is_none());
        }
        assert_eq!(branch.iter().count(), 3);
    }

    #[test]
    fn test_ids_are_fresh() {
        let a = create_node("notify", NodeOptions::new()).unwrap();
        let b = create_node("notify", NodeOptions::new()).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
