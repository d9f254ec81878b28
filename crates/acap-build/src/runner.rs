use std::time::Duration;

use acap_config::BuildRunnerConfig;
use acap_schemas::BuildJob;
use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

/// Outcome of one poll-loop iteration (§4.2 Phase 2), surfaced so `run`'s
/// caller and tests can observe the termination predicate's inputs without
/// re-deriving them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub pending: i64,
    pub running: i64,
    pub requeued: i64,
}

impl PollOutcome {
    /// §4.2 Phase 2 step 3: all three must be zero for the build to be
    /// considered drained. Permanently failed tasks never appear in
    /// `pending`/`running`, so they never block this.
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.running == 0 && self.requeued == 0
    }
}

/// Phase 1: idempotently generate one recording-task per chunk belonging to
/// the build's site, ordered by `chunk_id`. Safe to run more than once for
/// the same `build_id` (§4.2 Phase 1, spec property 5) — `acap_db::
/// upsert_recording_task` resets in-flight rows to `pending` and leaves
/// terminal ones untouched. Returns the chunk count generated from.
pub async fn generate_recording_tasks(pool: &PgPool, build: &BuildJob) -> Result<usize> {
    let chunks = acap_db::fetch_chunk_sources_for_site(pool, build.site_id).await?;

    for chunk in &chunks {
        acap_db::upsert_recording_task(
            pool,
            build.build_id,
            build.site_id,
            chunk.chunk_id,
            &chunk.source_url,
            &json!({"chunk_type": "task_driven"}),
        )
        .await?;
    }

    Ok(chunks.len())
}

/// One iteration of the poll loop: aggregate counts, run the retry pass, and
/// report whether the build is drained (§4.2 Phase 2 / Phase 3).
async fn poll_once(pool: &PgPool, build_id: Uuid, max_attempts: u32) -> Result<PollOutcome> {
    let counts = acap_db::task_status_counts(pool, build_id).await?;
    let requeued = acap_db::retry_failed_recording_tasks(pool, build_id, max_attempts as i32).await?;

    Ok(PollOutcome {
        pending: counts.pending,
        running: counts.running,
        requeued,
    })
}

/// Phase 4: archive the current active version (if any) and publish a new
/// one. Publish failures are logged and swallowed — they must never fail
/// the build (§4.2 Phase 4 step 4).
pub async fn publish(pool: &PgPool, site_id: Uuid, build_id: Uuid) {
    match acap_db::publish_new_site_version(pool, site_id, build_id).await {
        Ok(version) => {
            tracing::info!(
                %site_id, %build_id, version_number = version.version_number,
                "published new site version"
            );
        }
        Err(err) => {
            tracing::warn!(%site_id, %build_id, error = %format!("{err:#}"), "publish failed, build still completes");
        }
    }
}

/// Drive one build-job from `(action_build, running)` through to a terminal
/// state (§4.2). Any error from Phases 1-3 marks the build `(action_build,
/// error)` with the message in `config.last_error` and is re-raised for the
/// caller to log; Phase 4 (publish) never propagates an error of its own.
pub async fn run(pool: &PgPool, config: &BuildRunnerConfig, build: BuildJob) -> Result<()> {
    match run_inner(pool, config, &build).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let message = format!("{err:#}");
            if let Err(mark_err) = acap_db::mark_build_error(pool, build.build_id, &message).await {
                tracing::error!(
                    build_id = %build.build_id, error = %format!("{mark_err:#}"),
                    "failed to persist build error state"
                );
            }
            Err(err)
        }
    }
}

async fn run_inner(pool: &PgPool, config: &BuildRunnerConfig, build: &BuildJob) -> Result<()> {
    let build_id = build.build_id;

    let chunk_count = generate_recording_tasks(pool, build).await?;
    if chunk_count == 0 {
        tracing::info!(%build_id, "no chunks for site, completing build with zero tasks");
        acap_db::mark_build_completed(pool, build_id).await?;
        return Ok(());
    }

    let check_interval = Duration::from_secs(config.check_interval_seconds.max(1));

    loop {
        acap_db::heartbeat_build_job(pool, build_id).await?;
        let outcome = poll_once(pool, build_id, config.max_attempts).await?;

        if outcome.requeued > 0 {
            tracing::debug!(%build_id, requeued = outcome.requeued, "retry pass requeued failed tasks");
        }

        if outcome.is_drained() {
            break;
        }

        tokio::time::sleep(check_interval).await;
    }

    publish(pool, build.site_id, build_id).await;
    acap_db::mark_build_completed(pool, build_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drained_requires_all_three_conditions_zero() {
        assert!(PollOutcome { pending: 0, running: 0, requeued: 0 }.is_drained());
        assert!(!PollOutcome { pending: 1, running: 0, requeued: 0 }.is_drained());
        assert!(!PollOutcome { pending: 0, running: 1, requeued: 0 }.is_drained());
        assert!(!PollOutcome { pending: 0, running: 0, requeued: 1 }.is_drained());
    }
}
