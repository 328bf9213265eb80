// crates/certrun/tests/dispatch_test.rs

use async_trait::async_trait;
use certcore::{create_node, NodeOptions, WorkflowGraph};
use certrun::{
    DispatchError, DispatcherConfig, RunEvent, RunSession, RunState, RunTransport, TransportError,
    WorkflowDispatcher, WorkflowRunRequest, WorkflowRunResult,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Backend stand-in answering every request with a fixed body
struct StubBackend {
    response: Value,
    requests: Mutex<Vec<WorkflowRunRequest>>,
}

impl StubBackend {
    fn answering(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl RunTransport for StubBackend {
    async fn submit(&self, request: &WorkflowRunRequest) -> Result<WorkflowRunResult, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(serde_json::from_value(self.response.clone())?)
    }
}

/// Transport whose backend is unreachable
struct DownBackend;

#[async_trait]
impl RunTransport for DownBackend {
    async fn submit(&self, _request: &WorkflowRunRequest) -> Result<WorkflowRunResult, TransportError> {
        Err(TransportError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        })
    }
}

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

fn valid_graph() -> WorkflowGraph {
    let graph = WorkflowGraph::new();
    let apply = create_node("apply", NodeOptions::new().with_provider("cloudflare")).unwrap();
    graph.insert_after(graph.root().id(), apply).unwrap()
}

fn invalid_graph() -> WorkflowGraph {
    let doc = json!({ "nodes": [
        { "id": "6f1c1bd4-5d0e-4f53-9c61-2b8c0c4d7a10", "type": "start", "name": "Start" },
        { "id": "0b8a6f6e-2c4e-4a8b-8f0e-6f7d1c2b3a41", "type": "deploy", "name": "Deploy" }
    ] });
    WorkflowGraph::from_json(&doc.to_string()).unwrap()
}

#[tokio::test]
async fn test_code_zero_is_accepted() {
    init_tracing();
    let backend = StubBackend::answering(json!({ "code": 0 }));
    let dispatcher = WorkflowDispatcher::new(backend.clone());

    let ack = dispatcher.run("wf-1").await.unwrap();
    assert!(ack.accepted);

    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests.as_slice(), &[WorkflowRunRequest::new("wf-1")]);
}

#[tokio::test]
async fn test_non_zero_code_is_rejected_with_payload() {
    init_tracing();
    let backend = StubBackend::answering(json!({ "code": 42, "message": "provider unreachable" }));
    let dispatcher = WorkflowDispatcher::new(backend.clone());

    let err = dispatcher.run("wf-1").await.unwrap_err();
    assert_eq!(err.code(), Some(42));
    assert_eq!(err.message(), Some("provider unreachable"));
    match err {
        DispatchError::RunRejected { code, detail } => {
            assert_eq!(code, 42);
            assert_eq!(detail, json!({ "code": 42, "message": "provider unreachable" }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_rejection_is_not_retried() {
    let backend = StubBackend::answering(json!({ "code": 7 }));
    let dispatcher = WorkflowDispatcher::new(backend.clone());

    assert!(dispatcher.run("wf-1").await.is_err());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_events_follow_outcome() {
    let backend = StubBackend::answering(json!({ "code": 3, "msg": "quota exceeded" }));
    let dispatcher = WorkflowDispatcher::new(backend);
    let mut events = dispatcher.subscribe_events();

    let _ = dispatcher.run("wf-9").await;

    let first = events.recv().await.unwrap();
    assert!(matches!(first, RunEvent::Submitted { .. }));
    assert_eq!(first.workflow_id(), "wf-9");

    match events.recv().await.unwrap() {
        RunEvent::Rejected { code, detail, .. } => {
            assert_eq!(code, 3);
            assert_eq!(detail["msg"], "quota exceeded");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_failure_is_distinct_from_rejection() {
    let dispatcher = WorkflowDispatcher::new(Arc::new(DownBackend));
    let mut events = dispatcher.subscribe_events();

    let err = dispatcher.run("wf-1").await.unwrap_err();
    assert!(matches!(err, DispatchError::Transport(TransportError::Status { status: 502, .. })));
    assert_eq!(err.code(), None);

    let _submitted = events.recv().await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), RunEvent::Failed { .. }));
}

#[tokio::test]
async fn test_guard_never_runs_invalid_workflows() {
    let backend = StubBackend::answering(json!({ "code": 0 }));
    let dispatcher = WorkflowDispatcher::new(backend.clone());

    let err = dispatcher
        .run_validated(&invalid_graph(), "wf-1")
        .await
        .unwrap_err();
    match err {
        DispatchError::InvalidWorkflow(violations) => assert!(!violations.is_empty()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.calls(), 0);

    let ack = dispatcher.run_validated(&valid_graph(), "wf-1").await.unwrap();
    assert!(ack.accepted);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_session_state_machine() {
    let backend = StubBackend::answering(json!({ "code": 0, "data": { "runId": "r-1" } }));
    let dispatcher = WorkflowDispatcher::new(backend.clone());
    let mut session = RunSession::new("wf-1");
    let watcher = session.watch();
    assert_eq!(session.state(), RunState::Idle);

    let ack = session.submit(&dispatcher).await.unwrap();
    assert_eq!(ack.payload["data"]["runId"], "r-1");
    assert_eq!(session.state(), RunState::Accepted);
    assert_eq!(*watcher.borrow(), RunState::Accepted);

    let err = session.submit(&dispatcher).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition(RunState::Accepted)));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_session_ends_rejected() {
    let backend = StubBackend::answering(json!({ "code": 42, "message": "provider unreachable" }));
    let dispatcher = WorkflowDispatcher::new(backend);
    let mut session = RunSession::new("wf-1");

    assert!(session.submit(&dispatcher).await.is_err());
    assert_eq!(session.state(), RunState::Rejected);
    assert!(session.state().is_terminal());
}

#[tokio::test]
async fn test_session_stays_idle_on_invalid_workflow() {
    let backend = StubBackend::answering(json!({ "code": 0 }));
    let dispatcher = WorkflowDispatcher::new(backend.clone());
    let mut session = RunSession::new("wf-1");

    let err = session
        .submit_validated(&dispatcher, &invalid_graph())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidWorkflow(_)));
    assert_eq!(session.state(), RunState::Idle);
    assert_eq!(backend.calls(), 0);

    session
        .submit_validated(&dispatcher, &valid_graph())
        .await
        .unwrap();
    assert_eq!(session.state(), RunState::Accepted);
}

#[tokio::test]
async fn test_zero_event_buffer_is_usable() {
    let config = DispatcherConfig {
        event_buffer_size: 0,
        ..DispatcherConfig::default()
    };
    let dispatcher = WorkflowDispatcher::http(config);
    let mut events = dispatcher.subscribe_events();

    dispatcher.event_bus().emit(RunEvent::Submitted {
        workflow_id: "wf-1".to_string(),
        timestamp: chrono::Utc::now(),
    });
    assert_eq!(events.recv().await.unwrap().workflow_id(), "wf-1");
}
