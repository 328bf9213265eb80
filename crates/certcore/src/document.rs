//! JSON form of a workflow.
//!
//! A chain is written as a flat list of nodes, so the nesting depth of a
//! document only grows with branches inside branches, never with the
//! length of a chain.
//!
//! ```json
//! { "nodes": [
//!     { "id": "…", "type": "start", "name": "Start" },
//!     { "id": "…", "type": "branch", "name": "Branch", "branches": [
//!         [ { "id": "…", "type": "condition", "name": "Condition" },
//!           { "id": "…", "type": "notify", "name": "Notify" } ],
//!         [ { "id": "…", "type": "condition", "name": "Condition" } ]
//!     ] }
//! ] }
//! ```

use crate::{NodeConfig, NodeId, NodeKind, WorkflowGraph, WorkflowNode};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

#[derive(Serialize, Deserialize)]
struct Document {
    /// The root chain, starting with the root node
    nodes: Vec<NodeRecord>,
}

#[derive(Serialize, Deserialize)]
struct NodeRecord {
    id: NodeId,
    #[serde(rename = "type")]
    kind: NodeKind,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider_type: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    config: NodeConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    branches: Vec<Vec<NodeRecord>>,
}

fn chain_records(head: &WorkflowNode) -> Vec<NodeRecord> {
    let mut records = Vec::new();
    let mut current = Some(head);
    while let Some(node) = current {
        records.push(NodeRecord {
            id: node.id,
            kind: node.kind,
            name: node.name.clone(),
            provider_type: node.provider_type.clone(),
            config: node.config.clone(),
            branches: node.branches.iter().map(|head| chain_records(head)).collect(),
        });
        current = node.next.as_deref();
    }
    records
}

/// Link a list of records back to front into a chain
fn build_chain(records: Vec<NodeRecord>) -> Result<Arc<WorkflowNode>, &'static str> {
    let mut next = None;
    for record in records.into_iter().rev() {
        let branches = record
            .branches
            .into_iter()
            .map(build_chain)
            .collect::<Result<Vec<_>, _>>()?;
        next = Some(Arc::new(WorkflowNode {
            id: record.id,
            kind: record.kind,
            name: record.name,
            provider_type: record.provider_type,
            config: record.config,
            next,
            branches,
        }));
    }
    next.ok_or("a workflow chain needs at least one node")
}

impl Serialize for WorkflowGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Document {
            nodes: chain_records(self.root()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WorkflowGraph {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let document = Document::deserialize(deserializer)?;
        let root = build_chain(document.nodes).map_err(D::Error::custom)?;
        Ok(WorkflowGraph::from_root(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chains_are_written_flat() {
        let graph = WorkflowGraph::new();
        let start = graph.root().id();
        let notify = crate::create_node("notify", crate::NodeOptions::new()).unwrap();
        let graph = graph.insert_after(start, notify).unwrap();

        let value = serde_json::to_value(&graph).unwrap();
        let nodes = value["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["type"], "start");
        assert_eq!(nodes[1]["type"], "notify");
        assert!(nodes[0].get("next").is_none());
    }

    #[test]
    fn test_empty_chain_is_rejected() {
        let doc = json!({ "nodes": [] });
        assert!(serde_json::from_value::<WorkflowGraph>(doc).is_err());

        let doc = json!({ "nodes": [{
            "id": NodeId::new_v4(),
            "type": "branch",
            "name": "Branch",
            "branches": [[], []]
        }] });
        assert!(serde_json::from_value::<WorkflowGraph>(doc).is_err());
    }
}
