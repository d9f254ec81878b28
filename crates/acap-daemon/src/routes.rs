//! Axum router and all HTTP handlers for acap-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

use crate::{
    api_types::{HealthResponse, StatusResponse},
    state::AppState,
};

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let running_builds = acap_db::count_running_builds(&st.pool).await.unwrap_or(-1);
    let running_recording_tasks = acap_db::count_running_recording_tasks(&st.pool).await.unwrap_or(-1);

    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: st.uptime_secs(),
            config_hash: st.config_hash.clone(),
            running_builds,
            max_concurrent_builds: st.config.orchestrator.max_concurrent_builds,
            running_recording_tasks,
            queue_concurrency: st.config.queue_worker.concurrency,
        }),
    )
}
