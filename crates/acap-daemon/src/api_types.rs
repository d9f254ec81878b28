//! Request and response types for all acap-daemon HTTP endpoints.
//!
//! These types are `Serialize` so they can be JSON-encoded by Axum and
//! decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of scheduler activity, derived fresh from the
/// database on every call (§4.7 "scheduler metrics").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub config_hash: String,
    pub running_builds: i64,
    pub max_concurrent_builds: u32,
    pub running_recording_tasks: i64,
    pub queue_concurrency: u32,
}
