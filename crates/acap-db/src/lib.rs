// core-rs/crates/acap-db/src/lib.rs
//! The Store: the single synchronization mechanism for both scheduler tiers.
//!
//! Every cross-worker coordination primitive used by `acap-build`,
//! `acap-queue`, and `acap-orchestrator` lives here as a free function over
//! a `PgPool` — no repository trait indirection, direct `sqlx::query`/
//! `query_as` calls with `.context(...)`, matching the upstream store's
//! style.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::Row;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use acap_schemas::{BuildJob, Chunk, ExpandedChunk, RecordingTask, Site, SiteVersion, TaskStatusCounts};

pub const ENV_DB_URL: &str = "ACAP_DATABASE_URL";

/// Connect to Postgres using `ACAP_DATABASE_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Test helper used by integration tests and `acap-testkit`: connect using
/// `ACAP_DATABASE_URL` and ensure migrations are applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_build_task_table: bool,
}

pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='build_task'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_build_task_table: exists,
    })
}

// ---------------------------------------------------------------------------
// Site / Site-version / Document / Chunk reads (read-mostly inputs)
// ---------------------------------------------------------------------------

pub async fn fetch_site(pool: &PgPool, site_id: Uuid) -> Result<Site> {
    let row = sqlx::query("select site_id, domain, base_url, app_url from site where site_id = $1")
        .bind(site_id)
        .fetch_one(pool)
        .await
        .context("fetch_site failed")?;

    Ok(Site {
        site_id: row.try_get("site_id")?,
        domain: row.try_get("domain")?,
        base_url: row.try_get("base_url")?,
        app_url: row.try_get("app_url")?,
    })
}

/// Chunks belonging to a site's documents, ordered deterministically — the
/// order the Build Runner generates recording-tasks in (§4.2 Phase 1).
pub async fn fetch_chunks_for_site(pool: &PgPool, site_id: Uuid) -> Result<Vec<Chunk>> {
    let rows = sqlx::query(
        r#"
        select c.chunk_id, c.document_id, c.content, c.site_capability
        from chunk c
        join document d on d.document_id = c.document_id
        where d.site_id = $1
        order by c.chunk_id asc
        "#,
    )
    .bind(site_id)
    .fetch_all(pool)
    .await
    .context("fetch_chunks_for_site failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(Chunk {
            chunk_id: row.try_get("chunk_id")?,
            document_id: row.try_get("document_id")?,
            content: row.try_get("content")?,
            site_capability: row.try_get("site_capability")?,
        });
    }
    Ok(out)
}

/// A chunk joined with its document's `source_url` and the owning site's
/// metadata — exactly what the Recording Executor needs to build a Recorder
/// request (§4.3 step 2).
pub async fn fetch_expanded_chunk(pool: &PgPool, chunk_id: Uuid) -> Result<ExpandedChunk> {
    let row = sqlx::query(
        r#"
        select
            c.chunk_id, c.content, d.source_url,
            s.site_id, s.domain as site_name, s.base_url, s.app_url
        from chunk c
        join document d on d.document_id = c.document_id
        join site s on s.site_id = d.site_id
        where c.chunk_id = $1
        "#,
    )
    .bind(chunk_id)
    .fetch_one(pool)
    .await
    .context("fetch_expanded_chunk failed")?;

    Ok(ExpandedChunk {
        chunk_id: row.try_get("chunk_id")?,
        content: row.try_get("content")?,
        source_url: row.try_get("source_url")?,
        site_id: row.try_get("site_id")?,
        site_name: row.try_get("site_name")?,
        base_url: row.try_get("base_url")?,
        app_url: row.try_get("app_url")?,
    })
}

/// One chunk's id paired with the source URL of its owning document — the
/// `start_url` the Build Runner seeds each recording-task with in Phase 1.
#[derive(Debug, Clone)]
pub struct ChunkSource {
    pub chunk_id: Uuid,
    pub source_url: String,
}

/// Chunk ids and their document's `source_url`, ordered by `chunk_id` — the
/// exact read Build Runner Phase 1 (§4.2) drives its upsert loop from.
pub async fn fetch_chunk_sources_for_site(pool: &PgPool, site_id: Uuid) -> Result<Vec<ChunkSource>> {
    let rows = sqlx::query(
        r#"
        select c.chunk_id, d.source_url
        from chunk c
        join document d on d.document_id = c.document_id
        where d.site_id = $1
        order by c.chunk_id asc
        "#,
    )
    .bind(site_id)
    .fetch_all(pool)
    .await
    .context("fetch_chunk_sources_for_site failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(ChunkSource {
            chunk_id: row.try_get("chunk_id")?,
            source_url: row.try_get("source_url")?,
        });
    }
    Ok(out)
}

/// Persist a completed recording-task's capability onto its chunk. The sole
/// Store write the Recording Executor makes to the `chunk` table (§4.3
/// step 4).
pub async fn write_chunk_capability(pool: &PgPool, chunk_id: Uuid, capability: &Value) -> Result<()> {
    sqlx::query("update chunk set site_capability = $2 where chunk_id = $1")
        .bind(chunk_id)
        .bind(capability)
        .execute(pool)
        .await
        .context("write_chunk_capability failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Build-job lifecycle
// ---------------------------------------------------------------------------

fn row_to_build_job(row: &sqlx::postgres::PgRow) -> Result<BuildJob> {
    Ok(BuildJob {
        build_id: row.try_get("build_id")?,
        site_id: row.try_get("site_id")?,
        stage: row.try_get("stage")?,
        stage_status: row.try_get("stage_status")?,
        knowledge_started_at: row.try_get("knowledge_started_at")?,
        knowledge_completed_at: row.try_get("knowledge_completed_at")?,
        action_started_at: row.try_get("action_started_at")?,
        action_completed_at: row.try_get("action_completed_at")?,
        config: row.try_get("config")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Enqueue a new build-job in `(knowledge_build, completed)` — the entry
/// point the (out-of-scope, externally operated) knowledge-ingestion
/// pipeline hands off to the Orchestrator once a site's chunks are ready.
/// Exposed here so `acap-cli` can seed a build without a live ingestion
/// pipeline.
pub async fn enqueue_build_job(pool: &PgPool, build_id: Uuid, site_id: Uuid, config: &Value) -> Result<()> {
    sqlx::query(
        r#"
        insert into build_task (build_id, site_id, stage, stage_status, knowledge_completed_at, config)
        values ($1, $2, 'knowledge_build', 'completed', now(), $3)
        "#,
    )
    .bind(build_id)
    .bind(site_id)
    .bind(config)
    .execute(pool)
    .await
    .context("enqueue_build_job failed")?;
    Ok(())
}

pub async fn fetch_build_job(pool: &PgPool, build_id: Uuid) -> Result<BuildJob> {
    let row = sqlx::query(
        r#"
        select build_id, site_id, stage, stage_status, knowledge_started_at,
               knowledge_completed_at, action_started_at, action_completed_at,
               config, updated_at
        from build_task
        where build_id = $1
        "#,
    )
    .bind(build_id)
    .fetch_one(pool)
    .await
    .context("fetch_build_job failed")?;
    row_to_build_job(&row)
}

/// Atomically claim one eligible build-job (§4.5): either a fresh
/// `(knowledge_build, completed)` job, or a build stuck `(action_build,
/// running)` past the stale-recovery window (a worker that died mid-build).
/// Recovery candidates are preferred over fresh ones so abandoned work
/// drains first. Returns `None` if nothing is eligible right now.
pub async fn claim_build_job(
    pool: &PgPool,
    build_stale_timeout_minutes: i64,
) -> Result<Option<BuildJob>> {
    let row = sqlx::query(
        r#"
        update build_task
        set stage = 'action_build',
            stage_status = 'running',
            action_started_at = coalesce(action_started_at, now()),
            updated_at = now()
        where build_id = (
            select build_id
            from build_task
            where (stage = 'knowledge_build' and stage_status = 'completed')
               or (stage = 'action_build' and stage_status = 'running'
                   and updated_at < now() - make_interval(mins => $1::int))
            order by
                case when stage = 'action_build' and stage_status = 'running' then 0 else 1 end,
                build_id asc
            limit 1
            for update skip locked
        )
        returning build_id, site_id, stage, stage_status, knowledge_started_at,
                  knowledge_completed_at, action_started_at, action_completed_at,
                  config, updated_at
        "#,
    )
    .bind(build_stale_timeout_minutes)
    .fetch_optional(pool)
    .await
    .context("claim_build_job failed")?;

    row.as_ref().map(row_to_build_job).transpose()
}

/// Heartbeat a build-job by bumping `updated_at` without touching its
/// stage/status — used by the Build Runner's poll loop to signal liveness
/// independent of the stale-recovery ordering above.
pub async fn heartbeat_build_job(pool: &PgPool, build_id: Uuid) -> Result<()> {
    sqlx::query("update build_task set updated_at = now() where build_id = $1")
        .bind(build_id)
        .execute(pool)
        .await
        .context("heartbeat_build_job failed")?;
    Ok(())
}

pub async fn mark_build_completed(pool: &PgPool, build_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        update build_task
        set stage_status = 'completed', action_completed_at = now(), updated_at = now()
        where build_id = $1
        "#,
    )
    .bind(build_id)
    .execute(pool)
    .await
    .context("mark_build_completed failed")?;
    Ok(())
}

pub async fn mark_build_error(pool: &PgPool, build_id: Uuid, message: &str) -> Result<()> {
    sqlx::query(
        r#"
        update build_task
        set stage_status = 'error',
            config = jsonb_set(coalesce(config, '{}'::jsonb), '{last_error}', to_jsonb($2::text)),
            updated_at = now()
        where build_id = $1
        "#,
    )
    .bind(build_id)
    .bind(message)
    .execute(pool)
    .await
    .context("mark_build_error failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Recording-task generation (Build Runner Phase 1 — idempotent upsert)
// ---------------------------------------------------------------------------

/// Upsert one recording-task keyed by `(chunk_id, build_id)`. On conflict:
/// if the existing row is `pending`/`running`, reset it to `pending`
/// (re-entry after a crash); if `completed`/`failed`, leave it untouched so
/// finished work is never redone (§4.2 Phase 1).
pub async fn upsert_recording_task(
    pool: &PgPool,
    build_id: Uuid,
    site_id: Uuid,
    chunk_id: Uuid,
    start_url: &str,
    config: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into recording_task (
            build_id, site_id, chunk_id, start_url, status, progress,
            attempt_count, config, updated_at
        ) values (
            $1, $2, $3, $4, 'pending', 0, 0, $5, now()
        )
        on conflict (chunk_id, build_id) do update
        set status = case
                when recording_task.status in ('pending', 'running') then 'pending'
                else recording_task.status
            end,
            updated_at = case
                when recording_task.status in ('pending', 'running') then now()
                else recording_task.updated_at
            end
        "#,
    )
    .bind(build_id)
    .bind(site_id)
    .bind(chunk_id)
    .bind(start_url)
    .bind(config)
    .execute(pool)
    .await
    .context("upsert_recording_task failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Recording-task claim / heartbeat / terminal writes (Tier 2)
// ---------------------------------------------------------------------------

fn row_to_recording_task(row: &sqlx::postgres::PgRow) -> Result<RecordingTask> {
    Ok(RecordingTask {
        task_id: row.try_get("task_id")?,
        build_id: row.try_get("build_id")?,
        site_id: row.try_get("site_id")?,
        chunk_id: row.try_get("chunk_id")?,
        start_url: row.try_get("start_url")?,
        status: row.try_get("status")?,
        progress: row.try_get("progress")?,
        attempt_count: row.try_get("attempt_count")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        last_heartbeat: row.try_get("last_heartbeat")?,
        duration_ms: row.try_get("duration_ms")?,
        tokens_used: row.try_get("tokens_used")?,
        error_message: row.try_get("error_message")?,
        config: row.try_get("config")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const RECORDING_TASK_COLUMNS: &str = "task_id, build_id, site_id, chunk_id, start_url, status, \
    progress, attempt_count, started_at, completed_at, last_heartbeat, duration_ms, tokens_used, \
    error_message, config, updated_at";

/// Atomically claim one pending recording-task (§4.4). Retried tasks (more
/// recently updated) are preferred over untouched FIFO ones; a tie breaks on
/// `task_id` for determinism. `FOR UPDATE SKIP LOCKED` ensures two workers
/// racing never claim the same row.
pub async fn claim_recording_task(pool: &PgPool) -> Result<Option<RecordingTask>> {
    let query = format!(
        r#"
        update recording_task
        set status = 'running', started_at = now(), last_heartbeat = now(), updated_at = now()
        where task_id = (
            select task_id
            from recording_task
            where status = 'pending'
            order by updated_at desc, task_id asc
            limit 1
            for update skip locked
        )
        returning {RECORDING_TASK_COLUMNS}
        "#
    );

    let row = sqlx::query(&query)
        .fetch_optional(pool)
        .await
        .context("claim_recording_task failed")?;

    row.as_ref().map(row_to_recording_task).transpose()
}

pub async fn heartbeat_recording_task(pool: &PgPool, task_id: Uuid) -> Result<()> {
    sqlx::query("update recording_task set last_heartbeat = now(), updated_at = now() where task_id = $1")
        .bind(task_id)
        .execute(pool)
        .await
        .context("heartbeat_recording_task failed")?;
    Ok(())
}

/// Outcome written by the Recording Executor on successful completion
/// (§4.3 step 4). `partial_note` carries the Recorder's message when the
/// deadline was hit but a partial result was saved; status stays
/// `completed` either way.
pub async fn complete_recording_task(
    pool: &PgPool,
    task_id: Uuid,
    duration_ms: i64,
    tokens_used: Option<i64>,
    partial_note: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        update recording_task
        set status = 'completed',
            progress = 100,
            completed_at = now(),
            attempt_count = attempt_count + 1,
            duration_ms = $2,
            tokens_used = $3,
            error_message = $4,
            updated_at = now()
        where task_id = $1
        "#,
    )
    .bind(task_id)
    .bind(duration_ms)
    .bind(tokens_used)
    .bind(partial_note)
    .execute(pool)
    .await
    .context("complete_recording_task failed")?;
    Ok(())
}

/// Outcome written by the Recording Executor on any failure path — Recorder
/// failure, thrown exception, or deadline without a partial result
/// (§4.3 steps 5–6).
pub async fn fail_recording_task(pool: &PgPool, task_id: Uuid, message: &str) -> Result<()> {
    sqlx::query(
        r#"
        update recording_task
        set status = 'failed',
            error_message = $2,
            attempt_count = attempt_count + 1,
            updated_at = now()
        where task_id = $1
        "#,
    )
    .bind(task_id)
    .bind(message)
    .execute(pool)
    .await
    .context("fail_recording_task failed")?;
    Ok(())
}

/// Retry pass (§4.2 Phase 3 / §4.4 stale recovery shared predicate): reset
/// `failed` tasks with remaining attempts to `pending`. Returns the count
/// requeued, which the Build Runner uses in its termination predicate.
pub async fn retry_failed_recording_tasks(pool: &PgPool, build_id: Uuid, max_attempts: i32) -> Result<i64> {
    let result = sqlx::query(
        r#"
        update recording_task
        set status = 'pending',
            error_message = null,
            duration_ms = null,
            tokens_used = null,
            updated_at = now()
        where build_id = $1
          and status = 'failed'
          and attempt_count < $2
        "#,
    )
    .bind(build_id)
    .bind(max_attempts)
    .execute(pool)
    .await
    .context("retry_failed_recording_tasks failed")?;
    Ok(result.rows_affected() as i64)
}

/// Stale recovery (§4.4): any `running` task whose heartbeat is older than
/// `stale_timeout_minutes` is either requeued (attempts remain) or
/// terminally failed (attempts exhausted). Runs at Queue Worker startup and
/// before every claim attempt. Returns `(requeued, terminally_failed)`.
pub async fn recover_stale_recording_tasks(
    pool: &PgPool,
    stale_timeout_minutes: i64,
    max_attempts: i32,
) -> Result<(i64, i64)> {
    let requeued = sqlx::query(
        r#"
        update recording_task
        set status = 'pending',
            attempt_count = attempt_count + 1,
            error_message = null,
            updated_at = now()
        where status = 'running'
          and last_heartbeat < now() - make_interval(mins => $1::int)
          and attempt_count < $2
        "#,
    )
    .bind(stale_timeout_minutes)
    .bind(max_attempts)
    .execute(pool)
    .await
    .context("recover_stale_recording_tasks (requeue) failed")?
    .rows_affected() as i64;

    let failed = sqlx::query(
        r#"
        update recording_task
        set status = 'failed',
            error_message = 'Task stale: max attempts reached',
            updated_at = now()
        where status = 'running'
          and last_heartbeat < now() - make_interval(mins => $1::int)
          and attempt_count >= $2
        "#,
    )
    .bind(stale_timeout_minutes)
    .bind(max_attempts)
    .execute(pool)
    .await
    .context("recover_stale_recording_tasks (fail) failed")?
    .rows_affected() as i64;

    Ok((requeued, failed))
}

/// Aggregate count by status for one build — drives the Build Runner's poll
/// loop termination predicate and the Orchestrator's metrics emitter.
pub async fn task_status_counts(pool: &PgPool, build_id: Uuid) -> Result<TaskStatusCounts> {
    let row = sqlx::query(
        r#"
        select
            count(*) filter (where status = 'pending')::bigint as pending,
            count(*) filter (where status = 'running')::bigint as running,
            count(*) filter (where status = 'completed')::bigint as completed,
            count(*) filter (where status = 'failed')::bigint as failed
        from recording_task
        where build_id = $1
        "#,
    )
    .bind(build_id)
    .fetch_one(pool)
    .await
    .context("task_status_counts failed")?;

    Ok(TaskStatusCounts {
        pending: row.try_get("pending")?,
        running: row.try_get("running")?,
        completed: row.try_get("completed")?,
        failed: row.try_get("failed")?,
    })
}

// ---------------------------------------------------------------------------
// Orchestrator metrics (§4.5 periodic emitter)
// ---------------------------------------------------------------------------

/// Count of build-jobs currently `(action_build, running)` — the Orchestrator's
/// in-flight build count for its periodic `m/N` metrics line.
pub async fn count_running_builds(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "select count(*) from build_task where stage = 'action_build' and stage_status = 'running'",
    )
    .fetch_one(pool)
    .await
    .context("count_running_builds failed")?;
    Ok(count)
}

/// Count of recording-tasks currently `running` across every build — the
/// Orchestrator's in-flight task count for its periodic `m/N` metrics line.
pub async fn count_running_recording_tasks(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("select count(*) from recording_task where status = 'running'")
        .fetch_one(pool)
        .await
        .context("count_running_recording_tasks failed")?;
    Ok(count)
}

/// Ids of build-jobs currently `(action_build, running)`, used by the
/// Orchestrator's metrics emitter to report per-build progress.
pub async fn fetch_running_build_ids(pool: &PgPool) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "select build_id from build_task where stage = 'action_build' and stage_status = 'running'",
    )
    .fetch_all(pool)
    .await
    .context("fetch_running_build_ids failed")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// ---------------------------------------------------------------------------
// Blue-green publish (Build Runner Phase 4)
// ---------------------------------------------------------------------------

/// Archive the site's current `active` version (if any), then insert a new
/// version at `max(version_number) + 1` with status `active`. Runs in one
/// transaction so another reader never observes two active versions, or
/// zero. Publish failures must not fail the build — callers should log and
/// continue rather than propagate (§4.2 Phase 4).
pub async fn publish_new_site_version(
    pool: &PgPool,
    site_id: Uuid,
    build_id: Uuid,
) -> Result<SiteVersion> {
    let mut tx = pool.begin().await.context("publish: begin tx failed")?;

    sqlx::query(
        r#"
        update source_version
        set status = 'archived'
        where site_id = $1 and status = 'active'
        "#,
    )
    .bind(site_id)
    .execute(&mut *tx)
    .await
    .context("publish: archive previous active version failed")?;

    let row = sqlx::query(
        r#"
        insert into source_version (site_id, version_number, status, commit_message, published_at)
        select $1,
               coalesce((select max(version_number) from source_version where site_id = $1), 0) + 1,
               'active',
               $2,
               now()
        returning version_id, site_id, version_number, status, commit_message, created_by, published_at
        "#,
    )
    .bind(site_id)
    .bind(format!("build {build_id}"))
    .fetch_one(&mut *tx)
    .await
    .context("publish: insert new version failed")?;

    let version = SiteVersion {
        version_id: row.try_get("version_id")?,
        site_id: row.try_get("site_id")?,
        version_number: row.try_get("version_number")?,
        status: row.try_get("status")?,
        commit_message: row.try_get("commit_message")?,
        created_by: row.try_get("created_by")?,
        published_at: row.try_get("published_at")?,
    };

    tx.commit().await.context("publish: commit tx failed")?;
    Ok(version)
}

pub async fn fetch_active_site_version(pool: &PgPool, site_id: Uuid) -> Result<Option<SiteVersion>> {
    let row = sqlx::query(
        r#"
        select version_id, site_id, version_number, status, commit_message, created_by, published_at
        from source_version
        where site_id = $1 and status = 'active'
        "#,
    )
    .bind(site_id)
    .fetch_optional(pool)
    .await
    .context("fetch_active_site_version failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(SiteVersion {
        version_id: row.try_get("version_id")?,
        site_id: row.try_get("site_id")?,
        version_number: row.try_get("version_number")?,
        status: row.try_get("status")?,
        commit_message: row.try_get("commit_message")?,
        created_by: row.try_get("created_by")?,
        published_at: row.try_get("published_at")?,
    }))
}
