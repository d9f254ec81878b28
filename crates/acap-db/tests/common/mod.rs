use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn make_pool(url: &str) -> anyhow::Result<PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(url)
        .await?;
    acap_db::migrate(&pool).await?;
    Ok(pool)
}

/// Insert a site with a document and `n` chunks, plus one build-job in
/// `(knowledge_build, completed)` — the state the Orchestrator claims from.
pub async fn make_site_with_chunks(pool: &PgPool, n: usize) -> anyhow::Result<(Uuid, Uuid, Vec<Uuid>)> {
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

    let mut chunk_ids = Vec::with_capacity(n);
    for i in 0..n {
        let chunk_id = Uuid::new_v4();
        sqlx::query("insert into chunk (chunk_id, document_id, content) values ($1, $2, $3)")
            .bind(chunk_id)
            .bind(document_id)
            .bind(format!("chunk content {i}"))
            .execute(pool)
            .await?;
        chunk_ids.push(chunk_id);
    }

    let build_id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into build_task (build_id, site_id, stage, stage_status, knowledge_completed_at, config)
        values ($1, $2, 'knowledge_build', 'completed', now(), $3)
        "#,
    )
    .bind(build_id)
    .bind(site_id)
    .bind(json!({}))
    .execute(pool)
    .await?;

    Ok((site_id, build_id, chunk_ids))
}
