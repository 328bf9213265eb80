use crate::{GraphError, WorkflowGraph};
use std::sync::OnceLock;
use tokio::sync::watch;

/// What observers of a [`GraphStore`] see
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub graph: WorkflowGraph,
    /// Set by every replacement, cleared once the caller has persisted the tree
    pub dirty: bool,
    /// Bumped on every replacement so observers can detect change without
    /// comparing trees
    pub revision: u64,
}

/// Holder of the single live workflow tree being edited.
///
/// The store has one writer: the editing session that calls
/// [`replace_tree`](Self::replace_tree) / [`apply`](Self::apply). Writes are
/// last-write-wins; there is no merge logic. Readers get cheap clones of an
/// immutable graph, so a reader never sees a half-applied edit.
pub struct GraphStore {
    sender: watch::Sender<GraphSnapshot>,
}

impl GraphStore {
    pub fn new(graph: WorkflowGraph) -> Self {
        let (sender, _) = watch::channel(GraphSnapshot {
            graph,
            dirty: false,
            revision: 0,
        });
        Self { sender }
    }

    /// Process-wide store, seeded with an empty workflow on first use
    pub fn global() -> &'static GraphStore {
        static INSTANCE: OnceLock<GraphStore> = OnceLock::new();
        INSTANCE.get_or_init(|| GraphStore::new(WorkflowGraph::new()))
    }

    pub fn get_tree(&self) -> WorkflowGraph {
        self.sender.borrow().graph.clone()
    }

    /// Swap in a new tree produced by a graph operation
    pub fn replace_tree(&self, graph: WorkflowGraph) {
        self.sender.send_modify(|snapshot| {
            snapshot.graph = graph;
            snapshot.dirty = true;
            snapshot.revision += 1;
            tracing::debug!("Workflow tree replaced (revision {})", snapshot.revision);
        });
    }

    /// Load a tree without marking the store dirty, e.g. after reading it
    /// back from persistence
    pub fn reset(&self, graph: WorkflowGraph) {
        self.sender.send_modify(|snapshot| {
            snapshot.graph = graph;
            snapshot.dirty = false;
            snapshot.revision += 1;
        });
    }

    /// Run a graph operation on the current tree and commit its result.
    ///
    /// On error the store keeps its current tree and the error is returned
    /// unchanged.
    pub fn apply<F>(&self, op: F) -> Result<WorkflowGraph, GraphError>
    where
        F: FnOnce(&WorkflowGraph) -> Result<WorkflowGraph, GraphError>,
    {
        let current = self.get_tree();
        let graph = op(&current)?;
        self.replace_tree(graph.clone());
        Ok(graph)
    }

    pub fn subscribe(&self) -> watch::Receiver<GraphSnapshot> {
        self.sender.subscribe()
    }

    /// Read a projection of the current snapshot
    pub fn select<T>(&self, f: impl FnOnce(&GraphSnapshot) -> T) -> T {
        f(&self.sender.borrow())
    }

    pub fn revision(&self) -> u64 {
        self.sender.borrow().revision
    }

    pub fn is_dirty(&self) -> bool {
        self.sender.borrow().dirty
    }

    pub fn mark_clean(&self) {
        self.sender.send_if_modified(|snapshot| {
            let changed = snapshot.dirty;
            snapshot.dirty = false;
            changed
        });
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(WorkflowGraph::new())
    }
}
