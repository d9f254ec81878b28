//! Shared runtime state for acap-daemon.
//!
//! All route handlers receive `State<Arc<AppState>>`. Status is computed
//! fresh from the database on every `/v1/status` call rather than cached
//! here — the scheduler state that matters (in-flight builds and tasks)
//! already lives in Postgres.

use std::time::Instant;

use acap_config::AcapConfig;
use sqlx::PgPool;

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc-wrapped by callers) handle shared across all Axum
/// handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AcapConfig,
    pub config_hash: String,
    pub build: BuildInfo,
    started_at: Instant,
}

impl AppState {
    pub fn new(pool: PgPool, config: AcapConfig, config_hash: String) -> Self {
        Self {
            pool,
            config,
            config_hash,
            build: BuildInfo {
                service: "acap-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
