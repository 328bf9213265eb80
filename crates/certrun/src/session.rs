use crate::{DispatchError, RunAck, WorkflowDispatcher};
use certcore::{validate, WorkflowGraph};
use strum::Display;
use tokio::sync::watch;

/// Client-side view of one triggered run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RunState {
    Idle,
    Submitting,
    Accepted,
    Rejected,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Accepted | RunState::Rejected)
    }
}

/// One run trigger: `Idle -> Submitting -> {Accepted | Rejected}`.
///
/// A session submits at most once. Triggering again means starting a new
/// session. Transport failures also end in `Rejected`; the returned error
/// tells them apart from a backend rejection.
pub struct RunSession {
    workflow_id: String,
    state: watch::Sender<RunState>,
}

impl RunSession {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            workflow_id: workflow_id.into(),
            state,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Observe state transitions, e.g. to drive a progress indicator
    pub fn watch(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub async fn submit(&mut self, dispatcher: &WorkflowDispatcher) -> Result<RunAck, DispatchError> {
        self.begin()?;
        let outcome = dispatcher.run(&self.workflow_id).await;
        self.finish(&outcome);
        outcome
    }

    /// Like [`submit`](Self::submit), but refuses to leave `Idle` when
    /// `graph` has violations
    pub async fn submit_validated(
        &mut self,
        dispatcher: &WorkflowDispatcher,
        graph: &WorkflowGraph,
    ) -> Result<RunAck, DispatchError> {
        let violations = validate(graph);
        if !violations.is_empty() {
            return Err(DispatchError::InvalidWorkflow(violations));
        }
        self.submit(dispatcher).await
    }

    fn begin(&mut self) -> Result<(), DispatchError> {
        let current = self.state();
        if current != RunState::Idle {
            return Err(DispatchError::InvalidTransition(current));
        }
        self.state.send_replace(RunState::Submitting);
        Ok(())
    }

    fn finish(&mut self, outcome: &Result<RunAck, DispatchError>) {
        let next = match outcome {
            Ok(_) => RunState::Accepted,
            Err(_) => RunState::Rejected,
        };
        tracing::debug!("Run session for {} is now {}", self.workflow_id, next);
        self.state.send_replace(next);
    }
}
