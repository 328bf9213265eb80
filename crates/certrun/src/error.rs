use crate::RunState;
use certcore::Violation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    /// The backend answered with a non-zero code; `detail` is the full
    /// response object
    #[error("Run rejected with code {code}: {detail}")]
    RunRejected { code: i64, detail: serde_json::Value },

    #[error("Workflow has {} violation(s), refusing to run", .0.len())]
    InvalidWorkflow(Vec<Violation>),

    #[error("Cannot submit a run while {0}")]
    InvalidTransition(RunState),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// Backend outcome code of a rejected run
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::RunRejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Backend message of a rejected run
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::RunRejected { detail, .. } => detail
                .get("message")
                .or_else(|| detail.get("msg"))
                .and_then(|m| m.as_str()),
            _ => None,
        }
    }
}
