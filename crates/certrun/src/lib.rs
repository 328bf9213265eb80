//! Workflow run dispatch
//!
//! This crate submits a persisted workflow to the backend runner and turns
//! the runner's single outcome code into success or a structured error.

mod config;
mod dispatcher;
mod error;
mod events;
mod protocol;
mod session;
mod transport;

pub use config::DispatcherConfig;
pub use dispatcher::WorkflowDispatcher;
pub use error::{DispatchError, TransportError};
pub use events::{RunEvent, RunEventBus};
pub use protocol::{RunAck, WorkflowRunRequest, WorkflowRunResult};
pub use session::{RunSession, RunState};
pub use transport::{HttpTransport, RunTransport};
