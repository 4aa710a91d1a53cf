//! HTTP executor backed by reqwest

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::{ExecutionFailure, ExecutionOutcome, RequestExecutor};
use crate::entry::{HeadersMap, RequestSnapshot};

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Header carrying the entry's idempotency key
    pub idempotency_header: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: "replaybox/0.1.0".to_string(),
            idempotency_header: "Idempotency-Key".to_string(),
        }
    }
}

/// Executes stored request snapshots over HTTP, one attempt per call
pub struct HttpExecutor {
    client: Client,
    config: HttpConfig,
}

impl HttpExecutor {
    pub fn new(config: HttpConfig) -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(
        &self,
        request: &RequestSnapshot,
        idempotency_key: Option<&str>,
    ) -> ExecutionOutcome {
        let method = match Method::from_bytes(request.method.to_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return ExecutionOutcome::Terminal(ExecutionFailure::application(
                    format!("invalid HTTP method: {}", request.method),
                    Some("INVALID_REQUEST".to_string()),
                ));
            }
        };

        debug!(url = %request.url, %method, "Executing request");

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(key) = idempotency_key {
            builder = builder.header(self.config.idempotency_header.as_str(), key);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return classify_send_error(&request.url, e),
        };

        let status = response.status().as_u16();
        let headers: HeadersMap = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %request.url, status, error = %e, "Failed to read response body");
                return ExecutionOutcome::Retryable(ExecutionFailure::network(format!(
                    "failed to read body: {}",
                    e
                )));
            }
        };

        debug!(url = %request.url, status, size = body.len(), "Request completed");
        ExecutionOutcome::from_status(status, headers, body)
    }
}

fn classify_send_error(url: &str, e: reqwest::Error) -> ExecutionOutcome {
    if e.is_builder() {
        return ExecutionOutcome::Terminal(ExecutionFailure::application(
            format!("invalid request: {}", e),
            Some("INVALID_REQUEST".to_string()),
        ));
    }
    if e.is_redirect() {
        return ExecutionOutcome::Terminal(ExecutionFailure::application(
            "too many redirects",
            Some("TOO_MANY_REDIRECTS".to_string()),
        ));
    }

    warn!(url, error = %e, "Request failed in transport");
    if e.is_timeout() {
        ExecutionOutcome::Retryable(ExecutionFailure::timeout(e.to_string()))
    } else {
        ExecutionOutcome::Retryable(ExecutionFailure::network(e.to_string()))
    }
}
