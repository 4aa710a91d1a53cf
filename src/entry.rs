//! Ledger entry data model
//!
//! A [`LedgerEntry`] is the unit of durability: one accepted write-intent
//! request plus the replay bookkeeping the engine maintains for it.
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──attempt──▶ processing ──success──▶ (removed)
//!    ▲                     │
//!    └──retryable+budget───┤
//!                          └──terminal / budget exhausted──▶ failed
//! ```
//!
//! `completed` exists as a status value but is never stored: successful
//! entries are deleted and only observed through callbacks.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type HeadersMap = BTreeMap<String, String>;

/// Current wall-clock time in unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Immutable snapshot of the request captured at enqueue time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HeadersMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Bytes>,
}

impl RequestSnapshot {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: HeadersMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Processing => "processing",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail recorded on a `failed` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub request: RequestSnapshot,
    pub status: EntryStatus,
    pub attempt_count: u32,
    /// Unix milliseconds; defines processing and eviction order
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EntryError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl LedgerEntry {
    /// Fresh `pending` entry with no attempts
    pub fn new(id: impl Into<String>, request: RequestSnapshot, created_at: i64) -> Self {
        Self {
            id: id.into(),
            request,
            status: EntryStatus::Pending,
            attempt_count: 0,
            created_at,
            last_attempt_at: None,
            error: None,
            idempotency_key: None,
            metadata: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Apply a partial update in place
    ///
    /// `request`, `id`, `created_at` and the opaque caller fields are not
    /// reachable from a patch.
    pub fn apply(&mut self, patch: &EntryPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(count) = patch.attempt_count {
            self.attempt_count = count;
        }
        if let Some(at) = patch.last_attempt_at {
            self.last_attempt_at = Some(at);
        }
        match &patch.error {
            ErrorPatch::Keep => {}
            ErrorPatch::Set(error) => self.error = Some(error.clone()),
            ErrorPatch::Clear => self.error = None,
        }
    }
}

/// Tri-state update for the `error` field
///
/// Distinguishes "leave as is" from "remove".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ErrorPatch {
    #[default]
    Keep,
    Set(EntryError),
    Clear,
}

/// Partial update accepted by [`crate::store::EntryStore::update`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub status: Option<EntryStatus>,
    pub attempt_count: Option<u32>,
    pub last_attempt_at: Option<i64>,
    pub error: ErrorPatch,
}

impl EntryPatch {
    pub fn status(status: EntryStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Move to `processing`, bumping the attempt counter together with its timestamp
    pub fn attempt_started(attempt_count: u32, at: i64) -> Self {
        Self {
            status: Some(EntryStatus::Processing),
            attempt_count: Some(attempt_count),
            last_attempt_at: Some(at),
            error: ErrorPatch::Keep,
        }
    }

    pub fn failed(error: EntryError) -> Self {
        Self {
            status: Some(EntryStatus::Failed),
            error: ErrorPatch::Set(error),
            ..Default::default()
        }
    }

    /// Back to `pending` with any recorded error removed
    pub fn rearm() -> Self {
        Self {
            status: Some(EntryStatus::Pending),
            error: ErrorPatch::Clear,
            ..Default::default()
        }
    }
}
