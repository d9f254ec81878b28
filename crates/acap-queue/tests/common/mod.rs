use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn make_pool(url: &str) -> anyhow::Result<PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(8).connect(url).await?;
    acap_db::migrate(&pool).await?;
    Ok(pool)
}

/// Insert a site + document + `n` chunks + one build-job, and upsert one
/// pending recording-task per chunk. Returns the build_id.
pub async fn seed_pending_tasks(pool: &PgPool, n: usize) -> anyhow::Result<Uuid> {
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

    let build_id = Uuid::new_v4();
    sqlx::query(
        "insert into build_task (build_id, site_id, stage, stage_status, config) \
         values ($1, $2, 'action_build', 'running', $3)",
    )
    .bind(build_id)
    .bind(site_id)
    .bind(json!({}))
    .execute(pool)
    .await?;

    for i in 0..n {
        let chunk_id = Uuid::new_v4();
        sqlx::query("insert into chunk (chunk_id, document_id, content) values ($1, $2, $3)")
            .bind(chunk_id)
            .bind(document_id)
            .bind(format!("chunk {i}"))
            .execute(pool)
            .await?;

        acap_db::upsert_recording_task(
            pool,
            build_id,
            site_id,
            chunk_id,
            "https://example.test/start",
            &json!({}),
        )
        .await?;
    }

    Ok(build_id)
}
