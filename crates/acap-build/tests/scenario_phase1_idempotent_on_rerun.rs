mod common;

#[tokio::test]
async fn generating_tasks_twice_does_not_duplicate_or_reset_completed_work() -> anyhow::Result<()> {
    let url = match std::env::var(acap_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ACAP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = common::make_pool(&url).await?;
    let build = common::make_claimed_build(&pool, 3).await?;

    let n = acap_build::generate_recording_tasks(&pool, &build).await?;
    assert_eq!(n, 3);

    let counts = acap_db::task_status_counts(&pool, build.build_id).await?;
    assert_eq!(counts.total(), 3);
    assert_eq!(counts.pending, 3);

    // Complete one task out-of-band, the way the Executor would.
    let claimed = acap_db::claim_recording_task(&pool).await?.expect("one task claimable");
    acap_db::complete_recording_task(&pool, claimed.task_id, 10, Some(5), None).await?;

    // Re-run Phase 1: the completed task must stay completed, and the set of
    // recording-tasks must not grow.
    let n2 = acap_build::generate_recording_tasks(&pool, &build).await?;
    assert_eq!(n2, 3);

    let counts2 = acap_db::task_status_counts(&pool, build.build_id).await?;
    assert_eq!(counts2.total(), 3);
    assert_eq!(counts2.completed, 1);
    assert_eq!(counts2.pending, 2);

    Ok(())
}
