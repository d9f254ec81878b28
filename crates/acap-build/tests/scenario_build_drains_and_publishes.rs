mod common;

use acap_config::BuildRunnerConfig;
use std::time::Duration;

#[tokio::test]
async fn build_with_mocked_completion_drains_and_publishes_a_version() -> anyhow::Result<()> {
    let url = match std::env::var(acap_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ACAP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = common::make_pool(&url).await?;
    let build = common::make_claimed_build(&pool, 2).await?;
    let site_id = build.site_id;
    let build_id = build.build_id;

    let config = BuildRunnerConfig {
        check_interval_seconds: 1,
        max_attempts: 3,
    };

    let pool2 = pool.clone();
    let drain_handle = tokio::spawn(async move {
        // Stand in for the Recording Queue Worker: claim + complete both
        // seeded tasks shortly after the Build Runner generates them.
        tokio::time::sleep(Duration::from_millis(300)).await;
        for _ in 0..2 {
            if let Some(task) = acap_db::claim_recording_task(&pool2).await.unwrap() {
                acap_db::complete_recording_task(&pool2, task.task_id, 5, Some(1), None)
                    .await
                    .unwrap();
            }
        }
    });

    acap_build::run(&pool, &config, build).await?;
    drain_handle.await?;

    let job = acap_db::fetch_build_job(&pool, build_id).await?;
    assert_eq!(job.stage_status, "completed");
    assert!(job.action_completed_at.is_some());

    let version = acap_db::fetch_active_site_version(&pool, site_id).await?;
    assert!(version.is_some());
    assert_eq!(version.unwrap().version_number, 1);

    Ok(())
}
