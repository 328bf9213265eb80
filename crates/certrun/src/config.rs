/// Configuration for the run dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Backend base URL, without a trailing path
    pub base_url: String,
    /// Path of the run endpoint
    pub run_path: String,
    /// Sent verbatim as the `Authorization` header when set
    pub auth_token: Option<String>,
    pub event_buffer_size: usize,
}

impl DispatcherConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn run_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.run_path)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            run_path: "/api/workflow/run".to_string(),
            auth_token: None,
            event_buffer_size: 100,
        }
    }
}
