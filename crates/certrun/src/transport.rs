use crate::{DispatcherConfig, TransportError, WorkflowRunRequest, WorkflowRunResult};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;

/// Carries one run request to the backend and returns its answer.
///
/// Implementations do not interpret the outcome code; that is the
/// dispatcher's job.
#[async_trait]
pub trait RunTransport: Send + Sync {
    async fn submit(&self, request: &WorkflowRunRequest) -> Result<WorkflowRunResult, TransportError>;
}

/// JSON-over-HTTP transport posting to the backend's run endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    config: DispatcherConfig,
}

impl HttpTransport {
    pub fn new(config: DispatcherConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: DispatcherConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl RunTransport for HttpTransport {
    async fn submit(&self, request: &WorkflowRunRequest) -> Result<WorkflowRunResult, TransportError> {
        let url = self.config.run_url();
        tracing::debug!("POST {}", url);

        let mut builder = self.client.post(&url).json(request);
        if let Some(token) = &self.config.auth_token {
            builder = builder.header(AUTHORIZATION, token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Error statuses may still carry a coded body, which wins.
        match serde_json::from_str::<WorkflowRunResult>(&body) {
            Ok(result) => Ok(result),
            Err(_) if !status.is_success() => Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }),
            Err(e) => Err(TransportError::Decode(e)),
        }
    }
}
