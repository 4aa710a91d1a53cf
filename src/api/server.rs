use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{decompression::RequestDecompressionLayer, trace::TraceLayer};

use super::{
    services::{
        clear_entries, delete_entry, enqueue_entry, get_entry, get_state, health, list_entries,
        pause, resume, retry_entry, trigger_replay,
    },
    state::AppState,
};

/// Operator API routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(get_state))
        .route(
            "/entries",
            get(list_entries).post(enqueue_entry).delete(clear_entries),
        )
        .route("/entries/{id}", get(get_entry).delete(delete_entry))
        .route("/entries/{id}/retry", post(retry_entry))
        .route("/replay", post(trigger_replay))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // gzip request bodies are decoded before handlers run
                .layer(RequestDecompressionLayer::new()),
        )
}
