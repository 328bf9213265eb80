use crate::node::{check_provider, Iter};
use crate::{Error, GraphError, NodeConfig, NodeId, NodeKind, WorkflowNode};
use petgraph::dot::Dot;
use petgraph::graph::DiGraph;
use rpds::HashTrieMapSync;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Where a node hangs in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    /// Successor of the given node
    Next(NodeId),
    /// Head of one of the given branch's chains
    Chain(NodeId),
}

impl Link {
    fn parent(self) -> NodeId {
        match self {
            Link::Next(id) | Link::Chain(id) => id,
        }
    }
}

type ParentIndex = HashTrieMapSync<NodeId, Link>;

/// Persistent workflow tree rooted at a Start node.
///
/// Every structural operation returns a new graph. Only the nodes on the
/// path from the root to the edit point are rebuilt; all other nodes are
/// shared with the previous version, which stays valid and unchanged.
/// A persistent id index, shared between versions the same way, finds
/// that path without walking the tree.
#[derive(Clone)]
pub struct WorkflowGraph {
    root: Arc<WorkflowNode>,
    /// Link of every node except the root
    parents: ParentIndex,
}

/// Result of [`WorkflowGraph::insert_branch_after`]
#[derive(Debug, Clone)]
pub struct BranchInsertion {
    pub graph: WorkflowGraph,
    pub branch_id: NodeId,
    /// The anchor's former continuation. It is not part of `graph`; the
    /// caller re-attaches it with [`WorkflowGraph::insert_after`] or drops it.
    pub detached: Option<WorkflowNode>,
}

/// Record `node`, its chains and its successors, `node` itself hanging off `link`
fn index_nodes(parents: &mut ParentIndex, node: &WorkflowNode, link: Link) {
    let mut stack = vec![(node, link)];
    while let Some((node, link)) = stack.pop() {
        parents.insert_mut(node.id, link);
        if let Some(next) = &node.next {
            stack.push((next.as_ref(), Link::Next(node.id)));
        }
        for head in &node.branches {
            stack.push((head.as_ref(), Link::Chain(node.id)));
        }
    }
}

fn unindex_nodes<'a>(parents: &mut ParentIndex, nodes: impl Iterator<Item = &'a WorkflowNode>) {
    for node in nodes {
        parents.remove_mut(&node.id);
    }
}

fn relink(parents: &mut ParentIndex, id: NodeId, link: Option<Link>) {
    match link {
        Some(link) => parents.insert_mut(id, link),
        None => {
            parents.remove_mut(&id);
        }
    }
}

/// A node and everything inside its chains, without its successors
fn contained<'a>(node: &'a WorkflowNode) -> impl Iterator<Item = &'a WorkflowNode> {
    std::iter::once(node).chain(node.branches.iter().flat_map(|head| head.iter()))
}

fn last_id(node: &WorkflowNode) -> NodeId {
    let mut last = node;
    while let Some(next) = &last.next {
        last = next.as_ref();
    }
    last.id
}

/// Rebuild a linear segment so that `tail` follows its last node
fn append(segment: WorkflowNode, tail: Option<Arc<WorkflowNode>>) -> Option<Arc<WorkflowNode>> {
    let mut nodes = vec![segment];
    while let Some(next) = nodes.last_mut().and_then(|node| node.next.take()) {
        nodes.push(Arc::try_unwrap(next).unwrap_or_else(|shared| WorkflowNode::clone(&shared)));
    }
    nodes.into_iter().rev().fold(tail, |successor, mut node| {
        node.next = successor;
        Some(Arc::new(node))
    })
}

/// Put `replacement` in the slot of the last node of `path` and copy every
/// ancestor on the way back up to the root.
///
/// An emptied chain slot removes that chain from its branch.
fn splice(
    path: &[&Arc<WorkflowNode>],
    mut replacement: Option<Arc<WorkflowNode>>,
) -> Result<Arc<WorkflowNode>, GraphError> {
    for pair in path.windows(2).rev() {
        let (parent, child) = (pair[0], pair[1]);
        let mut copy = WorkflowNode::clone(parent);
        match copy.branches.iter().position(|head| Arc::ptr_eq(head, child)) {
            Some(index) => match replacement {
                Some(head) => copy.branches[index] = head,
                None => {
                    if copy.branches.len() <= 2 {
                        return Err(GraphError::BranchArityViolation {
                            branch_id: parent.id,
                            chains: copy.branches.len(),
                        });
                    }
                    copy.branches.remove(index);
                }
            },
            None => copy.next = replacement,
        }
        replacement = Some(Arc::new(copy));
    }
    replacement.ok_or(GraphError::CannotRemoveRoot)
}

impl WorkflowGraph {
    /// A workflow holding only its Start node
    pub fn new() -> Self {
        Self {
            root: Arc::new(WorkflowNode::bare(NodeKind::Start)),
            parents: ParentIndex::new_sync(),
        }
    }

    /// Wrap an already linked tree, indexing every node once
    pub(crate) fn from_root(root: Arc<WorkflowNode>) -> Self {
        let mut parents = ParentIndex::new_sync();
        if let Some(next) = &root.next {
            index_nodes(&mut parents, next, Link::Next(root.id));
        }
        for head in &root.branches {
            index_nodes(&mut parents, head, Link::Chain(root.id));
        }
        Self { root, parents }
    }

    pub fn root(&self) -> &WorkflowNode {
        &self.root
    }

    /// Pre-order walk over every node
    pub fn iter(&self) -> Iter<'_> {
        self.root.iter()
    }

    pub fn find(&self, id: NodeId) -> Option<&WorkflowNode> {
        self.locate(id)
            .and_then(|mut path| path.pop())
            .map(Arc::as_ref)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id == self.root.id || self.parents.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    /// Whether both graphs share the same root allocation
    pub fn ptr_eq(&self, other: &WorkflowGraph) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    /// Nodes from the root down to `target`, following parent links up and
    /// then resolving them top-down.
    fn locate(&self, target: NodeId) -> Option<Vec<&Arc<WorkflowNode>>> {
        let mut ids = vec![target];
        let mut current = target;
        while current != self.root.id {
            // A loaded document may reuse ids; never follow a cycle.
            if ids.len() > self.parents.size() {
                return None;
            }
            current = self.parents.get(&current)?.parent();
            ids.push(current);
        }

        let mut path = vec![&self.root];
        for id in ids.into_iter().rev().skip(1) {
            let parent: &Arc<WorkflowNode> = *path.last()?;
            let child = parent
                .next
                .iter()
                .chain(&parent.branches)
                .find(|child| child.id == id)?;
            path.push(child);
        }
        Some(path)
    }

    fn path_to(&self, target: NodeId) -> Result<Vec<&Arc<WorkflowNode>>, GraphError> {
        self.locate(target).ok_or(GraphError::NodeNotFound(target))
    }

    /// Copy one node through `change`, leaving every link as it was
    fn modify<F>(&self, id: NodeId, change: F) -> Result<Self, GraphError>
    where
        F: FnOnce(&mut WorkflowNode) -> Result<(), GraphError>,
    {
        let path = self.path_to(id)?;
        let mut copy = WorkflowNode::clone(path[path.len() - 1]);
        change(&mut copy)?;
        Ok(Self {
            root: splice(&path, Some(Arc::new(copy)))?,
            parents: self.parents.clone(),
        })
    }

    /// Splice `node` into the chain right after `anchor`.
    ///
    /// `node` may already carry successors (a previously detached tail);
    /// the anchor's old successor then follows the last of them.
    pub fn insert_after(&self, anchor: NodeId, node: WorkflowNode) -> Result<Self, GraphError> {
        let mut segment = Some(&node);
        while let Some(current) = segment {
            if !current.kind.is_insertable() {
                return Err(GraphError::InvalidPlacement(current.kind));
            }
            segment = current.next.as_deref();
        }

        let mut seen = HashSet::new();
        if let Some(dup) = node
            .iter()
            .find(|n| self.contains(n.id) || !seen.insert(n.id))
        {
            return Err(GraphError::DuplicateNodeId(dup.id));
        }

        let path = self.path_to(anchor)?;
        let target = path[path.len() - 1];
        let tail = target.next.clone();
        let inserted = node.id;

        let mut parents = self.parents.clone();
        index_nodes(&mut parents, &node, Link::Next(anchor));
        if let Some(tail) = &tail {
            parents.insert_mut(tail.id, Link::Next(last_id(&node)));
        }

        let mut copy = WorkflowNode::clone(target);
        copy.next = append(node, tail);
        let root = splice(&path, Some(Arc::new(copy)))?;

        tracing::debug!("Inserted node {} after {}", inserted, anchor);
        Ok(Self { root, parents })
    }

    /// Put a new Branch with `chain_count` empty chains in the anchor's
    /// successor slot. The former successor is detached, not preserved.
    pub fn insert_branch_after(
        &self,
        anchor: NodeId,
        chain_count: usize,
    ) -> Result<BranchInsertion, GraphError> {
        if chain_count < 2 {
            return Err(GraphError::InvalidChainCount(chain_count));
        }

        let path = self.path_to(anchor)?;
        let target = path[path.len() - 1];
        let detached = target.next.clone();

        let mut branch = WorkflowNode::bare(NodeKind::Branch);
        branch.branches = (0..chain_count).map(|_| WorkflowNode::empty_chain()).collect();
        let branch_id = branch.id;

        let mut parents = self.parents.clone();
        if let Some(tail) = &detached {
            unindex_nodes(&mut parents, tail.iter());
        }
        index_nodes(&mut parents, &branch, Link::Next(anchor));

        let mut copy = WorkflowNode::clone(target);
        copy.next = Some(Arc::new(branch));
        let graph = Self {
            root: splice(&path, Some(Arc::new(copy)))?,
            parents,
        };

        if let Some(tail) = &detached {
            tracing::debug!(
                "Branch {} inserted after {}, detached continuation at {}",
                branch_id,
                anchor,
                tail.id
            );
        }

        Ok(BranchInsertion {
            graph,
            branch_id,
            detached: detached.map(|tail| WorkflowNode::clone(&tail)),
        })
    }

    /// Remove a node and everything it contains.
    ///
    /// The node's successor takes its place. Removing a Condition head
    /// removes its whole chain.
    pub fn remove_node(&self, id: NodeId) -> Result<Self, GraphError> {
        if id == self.root.id {
            return Err(GraphError::CannotRemoveRoot);
        }

        let path = self.path_to(id)?;
        let target = path[path.len() - 1];
        let mut parents = self.parents.clone();

        let replacement = if target.kind == NodeKind::Condition {
            unindex_nodes(&mut parents, target.iter());
            None
        } else {
            unindex_nodes(&mut parents, contained(target));
            if let Some(next) = &target.next {
                relink(&mut parents, next.id, self.parents.get(&id).copied());
            }
            target.next.clone()
        };

        let root = splice(&path, replacement)?;
        tracing::debug!("Removed node {}", id);
        Ok(Self { root, parents })
    }

    /// Append an empty chain to a Branch
    pub fn add_chain(&self, branch_id: NodeId) -> Result<Self, GraphError> {
        let path = self.path_to(branch_id)?;
        let target = path[path.len() - 1];
        if !target.kind.is_container() {
            return Err(GraphError::NotABranch(branch_id));
        }

        let head = WorkflowNode::empty_chain();
        let mut parents = self.parents.clone();
        parents.insert_mut(head.id, Link::Chain(branch_id));

        let mut copy = WorkflowNode::clone(target);
        copy.branches.push(head);
        Ok(Self {
            root: splice(&path, Some(Arc::new(copy)))?,
            parents,
        })
    }

    /// Remove chain `index` of a Branch, keeping at least two
    pub fn remove_chain(&self, branch_id: NodeId, index: usize) -> Result<Self, GraphError> {
        let branch = self
            .find(branch_id)
            .ok_or(GraphError::NodeNotFound(branch_id))?;
        if !branch.kind.is_container() {
            return Err(GraphError::NotABranch(branch_id));
        }
        let head = branch
            .branches
            .get(index)
            .ok_or(GraphError::ChainIndexOutOfRange { branch_id, index })?;
        self.remove_node(head.id)
    }

    /// Replace a Branch by the work nodes of one of its chains, followed by
    /// the Branch's own successor
    pub fn collapse_branch(&self, branch_id: NodeId, keep: usize) -> Result<Self, GraphError> {
        let path = self.path_to(branch_id)?;
        let target = path[path.len() - 1];
        if !target.kind.is_container() {
            return Err(GraphError::NotABranch(branch_id));
        }
        let head = target
            .branches
            .get(keep)
            .ok_or(GraphError::ChainIndexOutOfRange { branch_id, index: keep })?;

        let link = self.parents.get(&branch_id).copied();
        let mut parents = self.parents.clone();
        for (index, chain) in target.branches.iter().enumerate() {
            if index != keep {
                unindex_nodes(&mut parents, chain.iter());
            }
        }
        parents.remove_mut(&head.id);
        parents.remove_mut(&branch_id);

        let replacement = match &head.next {
            Some(first) => {
                relink(&mut parents, first.id, link);
                if let Some(successor) = &target.next {
                    parents.insert_mut(successor.id, Link::Next(last_id(first)));
                }
                append(WorkflowNode::clone(first), target.next.clone())
            }
            None => {
                if let Some(successor) = &target.next {
                    relink(&mut parents, successor.id, link);
                }
                target.next.clone()
            }
        };

        Ok(Self {
            root: splice(&path, replacement)?,
            parents,
        })
    }

    /// Replace a node's opaque configuration
    pub fn update_config(&self, id: NodeId, config: NodeConfig) -> Result<Self, GraphError> {
        self.modify(id, |node| {
            node.config = config;
            Ok(())
        })
    }

    /// Change a node's provider, re-checking it against the registry
    pub fn set_provider(&self, id: NodeId, provider_type: Option<String>) -> Result<Self, GraphError> {
        self.modify(id, |node| {
            check_provider(node.kind, provider_type.as_deref())?;
            node.provider_type = provider_type;
            Ok(())
        })
    }

    pub fn rename(&self, id: NodeId, name: impl Into<String>) -> Result<Self, GraphError> {
        let name = name.into();
        self.modify(id, |node| {
            node.name = name;
            Ok(())
        })
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Directed graph of the tree: `next` edges and one edge per chain
    pub fn to_digraph(&self) -> DiGraph<String, String> {
        let mut graph = DiGraph::new();
        let mut stack = vec![(None, self.root.as_ref(), String::new())];

        while let Some((parent, node, label)) = stack.pop() {
            let text = match &node.provider_type {
                Some(provider) => format!("{} [{}]\n{}", node.name, provider, node.id),
                None => format!("{}\n{}", node.name, node.id),
            };
            let idx = graph.add_node(text);
            if let Some(parent) = parent {
                graph.add_edge(parent, idx, label);
            }
            if let Some(next) = &node.next {
                stack.push((Some(idx), next.as_ref(), "next".to_string()));
            }
            for (i, chain) in node.branches.iter().enumerate() {
                stack.push((Some(idx), chain.as_ref(), format!("chain {}", i)));
            }
        }

        graph
    }

    /// Graphviz rendering of [`Self::to_digraph`]
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.to_digraph()))
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for WorkflowGraph {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.root == other.root
    }
}

impl fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("root", &self.root)
            .field("indexed", &self.parents.size())
            .finish()
    }
}
