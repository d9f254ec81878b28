mod common;

use std::sync::Arc;
use std::time::Duration;

use acap_config::QueueWorkerConfig;
use acap_queue::QueueWorker;
use acap_recorder::MockRecorder;

#[tokio::test]
async fn worker_drains_all_pending_tasks_and_respects_stop_signal() -> anyhow::Result<()> {
    let url = match std::env::var(acap_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ACAP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = common::make_pool(&url).await?;
    let build_id = common::seed_pending_tasks(&pool, 5).await?;

    let config = QueueWorkerConfig {
        concurrency: 2,
        idle_wait_ms: 50,
        heartbeat_interval_ms: 200,
        ..QueueWorkerConfig::default()
    };

    let factory: acap_queue::RecorderFactory = Arc::new(|| Arc::new(MockRecorder::new()));
    let worker = QueueWorker::new(pool.clone(), config, factory);

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);

    let run_handle = tokio::spawn(async move { worker.run(stop_rx, Duration::from_secs(5)).await });

    // Give the worker enough iterations to drain all 5 seeded tasks, then
    // request shutdown.
    tokio::time::sleep(Duration::from_millis(500)).await;
    stop_tx.send(true)?;
    run_handle.await??;

    let counts = acap_db::task_status_counts(&pool, build_id).await?;
    assert_eq!(counts.completed, 5);
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.running, 0);

    Ok(())
}
