use acap_config::AcapConfig;
use acap_daemon::state::AppState;
use sqlx::PgPool;
use std::sync::Arc;

pub async fn make_pool(url: &str) -> anyhow::Result<PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(4).connect(url).await?;
    acap_db::migrate(&pool).await?;
    Ok(pool)
}

pub fn make_state(pool: PgPool) -> Arc<AppState> {
    Arc::new(AppState::new(pool, AcapConfig::default(), "testhash".to_string()))
}
