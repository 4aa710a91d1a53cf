use super::models::{Config, StoreBackend};
use crate::retry::RetryStrategy;
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Replay concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Store capacity must be at least 1")]
    ZeroCapacity,

    #[error("Fjall backend requires a non-empty store path")]
    MissingStorePath,

    #[error("Exponential retry base_ms ({base_ms}) exceeds max_ms ({max_ms})")]
    BackoffBaseExceedsMax { base_ms: u64, max_ms: u64 },

    #[error("Invalid probe health_url '{url}': {reason}")]
    InvalidHealthUrl { url: String, reason: String },

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: String },

    #[error("Idempotency header name must not be empty")]
    EmptyIdempotencyHeader,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_store(config)?;
    validate_replay(config)?;
    validate_executor(config)?;
    validate_probe(config)?;
    Ok(())
}

fn validate_store(config: &Config) -> Result<(), ValidationError> {
    if config.store.capacity == 0 {
        return Err(ValidationError::ZeroCapacity);
    }

    if config.store.backend == StoreBackend::Fjall && config.store.path.as_os_str().is_empty() {
        return Err(ValidationError::MissingStorePath);
    }

    Ok(())
}

fn validate_replay(config: &Config) -> Result<(), ValidationError> {
    if config.replay.concurrency == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }

    if config.replay.offline_poll_interval.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "replay.offline_poll_interval".to_string(),
        });
    }

    if let RetryStrategy::Exponential { base_ms, max_ms, .. } = config.replay.retry {
        if base_ms > max_ms {
            return Err(ValidationError::BackoffBaseExceedsMax { base_ms, max_ms });
        }
    }

    Ok(())
}

fn validate_executor(config: &Config) -> Result<(), ValidationError> {
    for (field, value) in [
        ("executor.connect_timeout", config.executor.connect_timeout),
        ("executor.request_timeout", config.executor.request_timeout),
    ] {
        if value.is_zero() {
            return Err(ValidationError::ZeroDuration {
                field: field.to_string(),
            });
        }
    }

    if config.executor.idempotency_header.trim().is_empty() {
        return Err(ValidationError::EmptyIdempotencyHeader);
    }

    Ok(())
}

/// Health URL must be an absolute http(s) URL
fn validate_probe(config: &Config) -> Result<(), ValidationError> {
    let Some(url) = &config.probe.health_url else {
        return Ok(());
    };

    let parsed = Url::parse(url).map_err(|e| ValidationError::InvalidHealthUrl {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ValidationError::InvalidHealthUrl {
            url: url.clone(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
