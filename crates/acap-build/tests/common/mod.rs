use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn make_pool(url: &str) -> anyhow::Result<PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(4).connect(url).await?;
    acap_db::migrate(&pool).await?;
    Ok(pool)
}

/// Insert a site with a document and `n` chunks, plus one build-job already
/// claimed into `(action_build, running)` — the state the Build Runner
/// receives from the Orchestrator.
pub async fn make_claimed_build(pool: &PgPool, n: usize) -> anyhow::Result<acap_schemas::BuildJob> {
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

    let build_id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into build_task (build_id, site_id, stage, stage_status, action_started_at, config)
        values ($1, $2, 'action_build', 'running', now(), $3)
        "#,
    )
    .bind(build_id)
    .bind(site_id)
    .bind(json!({}))
    .execute(pool)
    .await?;

    acap_db::fetch_build_job(pool, build_id).await
}
