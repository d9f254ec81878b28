//! Periodic metrics emitter (§4.5 Lifecycle step 2, §4.7): logs in-flight
//! build and task counts as `m/N`, plus per-build progress derived from
//! task-status aggregates. Best-effort — a query failure is logged and
//! skipped rather than propagated, since metrics must never take down the
//! scheduler loop.

use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawn the emitter as a background task. It ticks every `interval` until
/// `stop_rx` reports `true`, then exits.
pub fn spawn_metrics_emitter(
    pool: PgPool,
    interval: Duration,
    max_concurrent_builds: u32,
    queue_concurrency: u32,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = emit_once(&pool, max_concurrent_builds, queue_concurrency).await {
                        tracing::warn!(error = %format!("{err:#}"), "metrics emitter query failed");
                    }
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

async fn emit_once(pool: &PgPool, max_concurrent_builds: u32, queue_concurrency: u32) -> anyhow::Result<()> {
    let running_builds = acap_db::count_running_builds(pool).await?;
    let running_tasks = acap_db::count_running_recording_tasks(pool).await?;

    tracing::info!(
        builds = %format!("{running_builds}/{max_concurrent_builds}"),
        tasks = %format!("{running_tasks}/{queue_concurrency}"),
        "scheduler metrics"
    );

    for build_id in acap_db::fetch_running_build_ids(pool).await? {
        let counts = acap_db::task_status_counts(pool, build_id).await?;
        tracing::debug!(
            %build_id,
            pending = counts.pending,
            running = counts.running,
            completed = counts.completed,
            failed = counts.failed,
            "build progress"
        );
    }

    Ok(())
}
