//! Operator API models
//!
//! Request and response bodies for the operator endpoints. Entries are
//! rendered through [`EntryView`], which shows bodies as text instead of the
//! raw byte arrays used in the persisted layout.
//!
//! An enqueue submission (as JSON):
//!
//! ```json
//! {
//!   "method": "POST",
//!   "url": "https://api.example.com/orders",
//!   "headers": { "Content-Type": "application/json" },
//!   "body": "{\"sku\":\"A-1\"}",
//!   "idempotency_key": "order-7731",
//!   "metadata": { "source": "checkout" },
//!   "defer": false
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::entry::{EntryError, EntryStatus, HeadersMap, LedgerEntry, RequestSnapshot};
use crate::executor::ExecutionResponse;
use crate::ledger::{LedgerState, RequestOptions, RequestOutcome};
use crate::observability::MetricsSnapshot;
use crate::replay::ProcessOptions;

fn default_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnqueueRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HeadersMap,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Persist without an immediate attempt
    #[serde(default)]
    pub defer: bool,
}

impl EnqueueRequest {
    pub fn into_options(self) -> RequestOptions {
        let mut request = RequestSnapshot::new(self.method.to_uppercase(), self.url);
        request.headers = self.headers;
        request.body = self.body.map(Into::into);

        RequestOptions {
            request,
            id: self.id,
            idempotency_key: self.idempotency_key,
            metadata: self.metadata,
        }
    }
}

/// Entry as shown to operators
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EntryView {
    pub id: String,
    pub method: String,
    pub url: String,
    pub headers: HeadersMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub status: EntryStatus,
    pub attempt_count: u32,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EntryError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl From<LedgerEntry> for EntryView {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            method: entry.request.method,
            url: entry.request.url,
            headers: entry.request.headers,
            body: entry
                .request
                .body
                .map(|body| String::from_utf8_lossy(&body).into_owned()),
            status: entry.status,
            attempt_count: entry.attempt_count,
            created_at: entry.created_at,
            last_attempt_at: entry.last_attempt_at,
            error: entry.error,
            idempotency_key: entry.idempotency_key,
            metadata: entry.metadata,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseView {
    pub status: u16,
    pub headers: HeadersMap,
    pub body: String,
}

impl From<ExecutionResponse> for ResponseView {
    fn from(response: ExecutionResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnqueueResponse {
    Completed { response: ResponseView },
    Queued { entry: EntryView },
}

impl From<RequestOutcome> for EnqueueResponse {
    fn from(outcome: RequestOutcome) -> Self {
        match outcome {
            RequestOutcome::Completed(response) => EnqueueResponse::Completed {
                response: response.into(),
            },
            RequestOutcome::Queued(entry) => EnqueueResponse::Queued {
                entry: entry.into(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EntryListResponse {
    pub total: usize,
    pub entries: Vec<EntryView>,
}

/// Query for `GET /entries`
#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<EntryStatus>,
}

/// Body of `POST /replay`
#[derive(Debug, Deserialize, Default)]
pub struct ReplayRequest {
    pub concurrency: Option<usize>,
    pub stop_on_error: Option<bool>,
    /// Await the drain instead of starting it in the background
    #[serde(default)]
    pub wait: bool,
}

impl ReplayRequest {
    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            concurrency: self.concurrency,
            stop_on_error: self.stop_on_error,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub ledger: LedgerState,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
