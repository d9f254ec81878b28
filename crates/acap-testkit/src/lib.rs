//! Shared scenario-test scaffolding for the scheduler workspace: a pool
//! constructor, site/build seeding helpers, and a deterministic
//! drive-to-terminal harness for end-to-end `Orchestrator` scenarios that
//! span more than one crate.
//!
//! Crate-local `tests/common/mod.rs` files each carry a thin copy of
//! `make_pool`/`seed_ready_build`; this crate is for scenarios that need
//! more than that — full multi-component assembly, or a harness that
//! polls to completion instead of sleeping a fixed duration.

use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn make_pool(url: &str) -> Result<PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(8).connect(url).await?;
    acap_db::migrate(&pool).await?;
    Ok(pool)
}

/// Insert a site with one document and `n` chunks. Returns
/// `(site_id, document_id)`.
pub async fn seed_site_with_chunks(pool: &PgPool, n: usize) -> Result<(Uuid, Uuid)> {
    let site_id = Uuid::new_v4();
    sqlx::query("insert into site (site_id, domain, base_url) values ($1, $2, $3)")
        .bind(site_id)
        .bind(format!("{site_id}.example.test"))
        .bind("https://example.test")
        .execute(pool)
        .await?;

    let document_id = Uuid::new_v4();
    sqlx::query("insert into document (document_id, site_id, source_url) values ($1, $2, $3)")
        .bind(document_id)
        .bind(site_id)
        .bind("https://example.test/page")
        .execute(pool)
        .await?;

    for i in 0..n {
        sqlx::query("insert into chunk (chunk_id, document_id, content) values ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(document_id)
            .bind(format!("chunk {i}"))
            .execute(pool)
            .await?;
    }

    Ok((site_id, document_id))
}

/// Seed a site with `n` chunks plus a build-job ready for the
/// Orchestrator's claim (`(knowledge_build, completed)`). Returns
/// `(site_id, build_id)`.
pub async fn seed_ready_build(pool: &PgPool, n: usize) -> Result<(Uuid, Uuid)> {
    seed_ready_build_with_config(pool, n, json!({})).await
}

pub async fn seed_ready_build_with_config(pool: &PgPool, n: usize, config: Value) -> Result<(Uuid, Uuid)> {
    let (site_id, _document_id) = seed_site_with_chunks(pool, n).await?;
    let build_id = Uuid::new_v4();
    acap_db::enqueue_build_job(pool, build_id, site_id, &config).await?;
    Ok((site_id, build_id))
}

/// Poll `build_id`'s stage/status every `poll_every` until it reaches
/// `(action_build, completed)` or `(action_build, error)`, or `timeout`
/// elapses. Returns the terminal `stage_status`, or an error on timeout.
///
/// Scenario tests that sleep a fixed duration before asserting risk
/// flaking under load; this harness instead waits for the actual
/// terminal condition so tests are deterministic regardless of machine
/// speed.
pub async fn wait_for_build_terminal(pool: &PgPool, build_id: Uuid, timeout: Duration, poll_every: Duration) -> Result<String> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = acap_db::fetch_build_job(pool, build_id).await?;
        if job.stage == "action_build" && (job.stage_status == "completed" || job.stage_status == "error") {
            return Ok(job.stage_status);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("build {build_id} did not reach a terminal state within {timeout:?} (stage={}, stage_status={})", job.stage, job.stage_status);
        }
        tokio::time::sleep(poll_every).await;
    }
}
