use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted while a run request is in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    Submitted {
        workflow_id: String,
        timestamp: DateTime<Utc>,
    },
    Accepted {
        workflow_id: String,
        timestamp: DateTime<Utc>,
    },
    Rejected {
        workflow_id: String,
        code: i64,
        detail: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    /// The request never produced a backend outcome
    Failed {
        workflow_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    pub fn workflow_id(&self) -> &str {
        match self {
            RunEvent::Submitted { workflow_id, .. }
            | RunEvent::Accepted { workflow_id, .. }
            | RunEvent::Rejected { workflow_id, .. }
            | RunEvent::Failed { workflow_id, .. } => workflow_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RunEvent::Submitted { timestamp, .. }
            | RunEvent::Accepted { timestamp, .. }
            | RunEvent::Rejected { timestamp, .. }
            | RunEvent::Failed { timestamp, .. } => *timestamp,
        }
    }
}

/// Broadcast bus for run events
pub struct RunEventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl RunEventBus {
    /// A zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for RunEventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
