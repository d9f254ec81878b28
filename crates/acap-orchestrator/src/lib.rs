//! Orchestrator (§4.5): the top-level scheduler loop. Starts the Recording
//! Queue Worker in the background, runs a periodic metrics emitter, and
//! repeatedly claims eligible build-jobs up to `max_concurrent_builds`,
//! spawning one Build Runner per claim.
//!
//! Both tiers communicate only through the Store (`acap-db`); this crate
//! holds no shared memory with `acap-build`/`acap-queue` beyond the `PgPool`
//! and a shutdown watch channel.

mod metrics;
mod orchestrator;

pub use acap_queue::RecorderFactory;
pub use metrics::spawn_metrics_emitter;
pub use orchestrator::Orchestrator;
