use crate::node::check_provider;
use crate::{GraphError, NodeId, NodeKind, Violation, WorkflowGraph, WorkflowNode};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::HashMap;

/// Check a whole workflow tree and list every broken invariant.
///
/// An empty list means the tree is well-formed and may be submitted for
/// execution.
pub fn validate(graph: &WorkflowGraph) -> Vec<Violation> {
    let mut violations = Vec::new();
    let root = graph.root();

    if root.kind != NodeKind::Start {
        violations.push(Violation::RootNotStart {
            id: root.id,
            kind: root.kind,
        });
    }

    // Links are keyed by id, so a reused id shows up as extra predecessors.
    let mut links: DiGraphMap<NodeId, ()> = DiGraphMap::new();
    let mut occurrences: HashMap<NodeId, usize> = HashMap::new();
    let mut stack: Vec<(&WorkflowNode, Option<NodeId>, bool)> = vec![(root, None, false)];

    while let Some((node, parent, chain_head)) = stack.pop() {
        *occurrences.entry(node.id).or_default() += 1;
        links.add_node(node.id);
        if let Some(parent) = parent {
            links.add_edge(parent, node.id, ());
        }

        check_node(node, parent.is_some(), chain_head, &mut violations);

        if let Some(next) = &node.next {
            stack.push((next.as_ref(), Some(node.id), false));
        }
        for chain in node.branches.iter().rev() {
            stack.push((chain.as_ref(), Some(node.id), true));
        }
    }

    for id in links.nodes() {
        let expected = if id == root.id { 0 } else { 1 };
        let count = links.neighbors_directed(id, Direction::Incoming).count();
        if count != expected {
            violations.push(Violation::PredecessorCount { id, count, expected });
        }
    }

    for id in links.nodes() {
        let occurrences = occurrences.get(&id).copied().unwrap_or_default();
        if occurrences > 1 {
            violations.push(Violation::DuplicateId { id, occurrences });
        }
    }

    if !violations.is_empty() {
        tracing::debug!("Workflow has {} violation(s)", violations.len());
    }
    violations
}

fn check_node(node: &WorkflowNode, has_parent: bool, chain_head: bool, out: &mut Vec<Violation>) {
    let id = node.id;

    match node.kind {
        NodeKind::Start if has_parent => out.push(Violation::MisplacedStart { id }),
        NodeKind::Condition if !chain_head => out.push(Violation::MisplacedCondition { id }),
        _ => {}
    }

    if node.kind.is_container() {
        if node.branches.len() < 2 {
            out.push(Violation::BranchArity {
                id,
                chains: node.branches.len(),
            });
        }
        for (index, head) in node.branches.iter().enumerate() {
            if head.kind != NodeKind::Condition {
                out.push(Violation::ChainHeadNotCondition {
                    branch_id: id,
                    index,
                    kind: head.kind,
                });
            }
        }
    } else if !node.branches.is_empty() {
        out.push(Violation::UnexpectedChains { id, kind: node.kind });
    }

    let kind = node.kind;
    match check_provider(kind, node.provider_type.as_deref()) {
        Ok(()) => {}
        Err(GraphError::MissingProvider(_)) => out.push(Violation::MissingProvider { id, kind }),
        Err(GraphError::UnexpectedProvider { provider, .. }) => {
            out.push(Violation::UnexpectedProvider { id, kind, provider })
        }
        Err(GraphError::UnknownProvider { provider, .. }) => {
            out.push(Violation::UnknownProvider { id, kind, provider })
        }
        Err(other) => tracing::warn!("Unexpected provider check failure on {}: {}", id, other),
    }
}
