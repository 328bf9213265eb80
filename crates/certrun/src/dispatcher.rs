use crate::{
    DispatchError, DispatcherConfig, HttpTransport, RunAck, RunEvent, RunEventBus, RunTransport,
    WorkflowRunRequest,
};
use certcore::{validate, WorkflowGraph};
use chrono::Utc;
use std::sync::Arc;

/// Submits persisted workflows for execution and interprets the outcome.
///
/// The dispatcher neither retries nor times out, and does not serialize
/// overlapping calls; see [`crate::RunSession`] for the caller-side state
/// machine.
pub struct WorkflowDispatcher {
    transport: Arc<dyn RunTransport>,
    events: Arc<RunEventBus>,
}

impl WorkflowDispatcher {
    pub fn new(transport: Arc<dyn RunTransport>) -> Self {
        Self::with_events(transport, Arc::new(RunEventBus::default()))
    }

    pub fn with_events(transport: Arc<dyn RunTransport>, events: Arc<RunEventBus>) -> Self {
        Self { transport, events }
    }

    /// Dispatcher talking to the backend over HTTP
    pub fn http(config: DispatcherConfig) -> Self {
        let events = Arc::new(RunEventBus::new(config.event_buffer_size));
        Self::with_events(Arc::new(HttpTransport::new(config)), events)
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<RunEventBus> {
        &self.events
    }

    /// Ask the backend to run the workflow stored under `workflow_id`.
    ///
    /// The caller must have persisted the current tree under that id.
    pub async fn run(&self, workflow_id: &str) -> Result<RunAck, DispatchError> {
        let request = WorkflowRunRequest::new(workflow_id);

        tracing::info!("Submitting workflow run: {}", workflow_id);
        self.events.emit(RunEvent::Submitted {
            workflow_id: workflow_id.to_string(),
            timestamp: Utc::now(),
        });

        let result = match self.transport.submit(&request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Run request for {} failed: {}", workflow_id, e);
                self.events.emit(RunEvent::Failed {
                    workflow_id: workflow_id.to_string(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e.into());
            }
        };

        if result.is_success() {
            tracing::info!("Workflow run accepted: {}", workflow_id);
            self.events.emit(RunEvent::Accepted {
                workflow_id: workflow_id.to_string(),
                timestamp: Utc::now(),
            });
            return Ok(RunAck {
                accepted: true,
                payload: result.payload,
            });
        }

        let code = result.code;
        let detail = result.to_detail();
        tracing::warn!("Workflow run {} rejected with code {}: {}", workflow_id, code, detail);
        self.events.emit(RunEvent::Rejected {
            workflow_id: workflow_id.to_string(),
            code,
            detail: detail.clone(),
            timestamp: Utc::now(),
        });
        Err(DispatchError::RunRejected { code, detail })
    }

    /// Validate `graph` and only submit the run when it is well-formed.
    ///
    /// On violations the backend is never contacted.
    pub async fn run_validated(
        &self,
        graph: &WorkflowGraph,
        workflow_id: &str,
    ) -> Result<RunAck, DispatchError> {
        let violations = validate(graph);
        if !violations.is_empty() {
            tracing::warn!(
                "Refusing to run {}: {} violation(s)",
                workflow_id,
                violations.len()
            );
            return Err(DispatchError::InvalidWorkflow(violations));
        }
        self.run(workflow_id).await
    }
}
