//! Request execution
//!
//! A [`RequestExecutor`] performs exactly one network attempt for a stored
//! request snapshot and classifies the result:
//!
//! - transport failures (connect, timeout, abort) → retryable
//! - 5xx-class responses → retryable
//! - 4xx-class responses → terminal
//! - malformed requests and other application errors → terminal
//!
//! The replay engine trusts this classification and never inspects status
//! codes itself.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::entry::{EntryError, HeadersMap, RequestSnapshot};

pub use http::{HttpConfig, HttpExecutor};

/// Successful response returned by an executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResponse {
    pub status: u16,
    pub headers: HeadersMap,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused, timeout, abort
    Network,
    /// Non-success HTTP status
    Status(u16),
    /// Executor-defined, non-network, non-retryable
    Application,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => f.write_str("network"),
            FailureKind::Status(code) => write!(f, "http {}", code),
            FailureKind::Application => f.write_str("application"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind} failure: {message}")]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
    pub code: Option<String>,
}

impl ExecutionFailure {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Network,
            message: message.into(),
            code: Some("NETWORK_ERROR".to_string()),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Network,
            message: message.into(),
            code: Some("TIMEOUT".to_string()),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Status(status),
            message: message.into(),
            code: Some(format!("HTTP_{}", status)),
        }
    }

    pub fn application(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            kind: FailureKind::Application,
            message: message.into(),
            code,
        }
    }

    pub fn is_network(&self) -> bool {
        self.kind == FailureKind::Network
    }

    /// Detail stored on a `failed` entry
    pub fn to_entry_error(&self) -> EntryError {
        EntryError {
            message: self.message.clone(),
            code: self.code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success(ExecutionResponse),
    Retryable(ExecutionFailure),
    Terminal(ExecutionFailure),
}

impl ExecutionOutcome {
    /// Classify a completed HTTP exchange by status code
    pub fn from_status(status: u16, headers: HeadersMap, body: Bytes) -> Self {
        match status {
            200..=299 => ExecutionOutcome::Success(ExecutionResponse {
                status,
                headers,
                body,
            }),
            500..=599 => ExecutionOutcome::Retryable(ExecutionFailure::status(
                status,
                format!("server error: HTTP {}", status),
            )),
            _ => ExecutionOutcome::Terminal(ExecutionFailure::status(
                status,
                format!("request rejected: HTTP {}", status),
            )),
        }
    }
}

#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Perform one attempt; never retries internally
    async fn execute(
        &self,
        request: &RequestSnapshot,
        idempotency_key: Option<&str>,
    ) -> ExecutionOutcome;
}
