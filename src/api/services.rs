use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use http_body_util::BodyExt;
use std::collections::HashMap;
use tracing::{error, info};

use super::{
    models::{
        EnqueueRequest, EnqueueResponse, EntryListResponse, EntryView, HealthResponse, ListQuery,
        ReplayRequest, StateResponse,
    },
    state::AppState,
    validation::validate_enqueue,
};
use crate::api::error::ApiError;
use crate::ledger::RequestOutcome;
use crate::replay::ProcessOutcome;

const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Enqueue-or-execute endpoint (POST /entries)
///
/// Runs the request immediately when the ledger is online and returns the
/// upstream response (200). Network failures and offline submissions are
/// persisted instead (201). With `"defer": true` the request is persisted
/// without an attempt.
pub async fn enqueue_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    super::utils::require_json(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    )?;

    // Decompression already handled by RequestDecompressionLayer
    let body_bytes = read_body(body).await?;

    let request: EnqueueRequest = serde_json::from_slice(&body_bytes)?;
    validate_enqueue(&request).map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    let defer = request.defer;
    let options = request.into_options();

    let outcome = if defer {
        RequestOutcome::Queued(state.ledger.enqueue(options).await?)
    } else {
        state.ledger.request(options).await?
    };

    let status = match outcome {
        RequestOutcome::Completed(_) => StatusCode::OK,
        RequestOutcome::Queued(_) => StatusCode::CREATED,
    };

    Ok((status, Json(EnqueueResponse::from(outcome))))
}

async fn read_body(body: axum::body::Body) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes()
        .to_vec();

    super::utils::check_body_size(&data, MAX_PAYLOAD_SIZE)?;

    Ok(data)
}

/// GET /entries, optionally filtered by `?status=`
pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries: Vec<EntryView> = state
        .ledger
        .list()
        .await?
        .into_iter()
        .filter(|entry| query.status.is_none_or(|status| entry.status == status))
        .map(EntryView::from)
        .collect();

    Ok(Json(EntryListResponse {
        total: entries.len(),
        entries,
    }))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .ledger
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("entry {id}")))?;

    Ok(Json(EntryView::from(entry)))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.ledger.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_entries(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.ledger.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-arm a failed entry (POST /entries/{id}/retry)
pub async fn retry_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.ledger.retry(&id).await?;
    Ok(Json(EntryView::from(entry)))
}

/// Trigger a drain (POST /replay)
///
/// The body is optional. With `"wait": true` the handler awaits the loop and
/// returns its outcome; otherwise the drain runs in the background (202).
pub async fn trigger_replay(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<axum::response::Response, ApiError> {
    let request: ReplayRequest = if body.is_empty() {
        ReplayRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };

    if request.concurrency == Some(0) {
        return Err(ApiError::InvalidPayload("concurrency must be at least 1".into()));
    }

    let options = request.process_options();

    if request.wait {
        let outcome = state.ledger.process(options).await?;
        return Ok((StatusCode::OK, Json(outcome)).into_response());
    }

    if state.ledger.is_destroyed() {
        return Err(crate::ledger::LedgerError::Destroyed.into());
    }

    let ledger = state.ledger.clone();
    tokio::spawn(async move {
        match ledger.process(options).await {
            Ok(ProcessOutcome::Completed(summary)) => {
                info!(succeeded = summary.succeeded, failed = summary.failed, "Operator replay finished")
            }
            Ok(ProcessOutcome::AlreadyRunning) => info!("Operator replay skipped, loop already active"),
            Err(e) => error!(error = %e, "Operator replay failed"),
        }
    });

    Ok(StatusCode::ACCEPTED.into_response())
}

pub async fn get_state(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(StateResponse {
        ledger: state.ledger.state().await?,
        metrics: state.metrics.snapshot(),
    }))
}

pub async fn pause(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.ledger.pause()?;
    get_state(State(state)).await
}

pub async fn resume(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.ledger.resume()?;
    get_state(State(state)).await
}

/// Health check endpoint (GET /health)
///
/// Returns 503 Service Unavailable if any component is unhealthy.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    components.insert("api".to_string(), "healthy".to_string());

    let ledger_status = if state.ledger.is_destroyed() {
        "unhealthy"
    } else {
        "healthy"
    };
    components.insert("ledger".to_string(), ledger_status.to_string());

    if let Some(disk) = &state.disk {
        let store_status = match disk.health_check() {
            Ok(()) => "healthy",
            Err(e) => {
                error!(error = %e, "Store health check failed");
                "unhealthy"
            }
        };
        components.insert("store".to_string(), store_status.to_string());
    }

    let all_healthy = components.values().all(|status| status == "healthy");
    let (overall_status, status_code) = if all_healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
