use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of the run trigger: `{ "id": "<workflow id>" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunRequest {
    pub id: String,
}

impl WorkflowRunRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Backend answer: `{ "code": <number>, ...payload }`. Code 0 is success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub code: i64,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl WorkflowRunResult {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Human readable message, if the backend sent one
    pub fn message(&self) -> Option<&str> {
        self.payload
            .get("message")
            .or_else(|| self.payload.get("msg"))
            .and_then(Value::as_str)
    }

    /// The whole response as one JSON object, code included
    pub fn to_detail(&self) -> Value {
        let mut detail = self.payload.clone();
        detail.insert("code".to_string(), Value::from(self.code));
        Value::Object(detail)
    }
}

/// Acknowledgement of an accepted run
#[derive(Debug, Clone, PartialEq)]
pub struct RunAck {
    pub accepted: bool,
    pub payload: Map<String, Value>,
}
