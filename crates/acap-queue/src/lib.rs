//! Recording Queue Worker (§4.4): a global consumer pool that claims
//! pending recording-tasks, runs each through the Executor under a
//! heartbeat, and recovers stale work left behind by crashed workers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use acap_config::QueueWorkerConfig;
use acap_executor::ExecutorConfig;
use acap_recorder::RecorderAdapter;
use acap_schemas::RecordingTask;
use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinSet;

pub type RecorderFactory = Arc<dyn Fn() -> Arc<dyn RecorderAdapter> + Send + Sync>;

pub struct QueueWorker {
    pool: PgPool,
    config: QueueWorkerConfig,
    recorder_factory: RecorderFactory,
    exports_root: Option<PathBuf>,
}

impl QueueWorker {
    pub fn new(pool: PgPool, config: QueueWorkerConfig, recorder_factory: RecorderFactory) -> Self {
        Self {
            pool,
            config,
            recorder_factory,
            exports_root: None,
        }
    }

    pub fn with_exports_root(mut self, root: PathBuf) -> Self {
        self.exports_root = Some(root);
        self
    }

    async fn recover_stale(&self) -> Result<(i64, i64)> {
        let (requeued, failed) = acap_db::recover_stale_recording_tasks(
            &self.pool,
            self.config.stale_timeout_minutes,
            self.config.max_attempts as i32,
        )
        .await?;
        if requeued > 0 || failed > 0 {
            tracing::debug!(requeued, failed, "stale recording-task recovery");
        } else {
            tracing::trace!("stale recovery found no work");
        }
        Ok((requeued, failed))
    }

    fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            task_timeout_minutes: self.config.task_timeout_minutes,
            exports_root: self.exports_root.clone(),
        }
    }

    /// Run the main claim loop until `stop_rx` reports `true`, then wait for
    /// in-flight tasks up to `shutdown_timeout` before returning (§4.4
    /// graceful shutdown). Abandoned in-flight tasks beyond the timeout are
    /// recovered by the next stale-recovery pass, on this process or another.
    pub async fn run(&self, mut stop_rx: watch::Receiver<bool>, shutdown_timeout: Duration) -> Result<()> {
        self.recover_stale().await?;

        let mut in_flight: JoinSet<()> = JoinSet::new();
        let heartbeat_interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        let idle_wait = Duration::from_millis(self.config.idle_wait_ms);

        loop {
            if *stop_rx.borrow() {
                break;
            }
            self.recover_stale().await?;

            while in_flight.len() < self.config.concurrency as usize {
                if *stop_rx.borrow() {
                    break;
                }
                match acap_db::claim_recording_task(&self.pool).await? {
                    Some(task) => {
                        let pool = self.pool.clone();
                        let recorder = (self.recorder_factory)();
                        let executor_config = self.executor_config();
                        in_flight.spawn(run_one(pool, recorder, executor_config, heartbeat_interval, task));
                    }
                    None => break,
                }
            }

            if in_flight.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(idle_wait) => {}
                    _ = stop_rx.changed() => {}
                }
            } else {
                tokio::select! {
                    _ = in_flight.join_next() => {}
                    _ = stop_rx.changed() => {}
                }
            }
        }

        let _ = tokio::time::timeout(shutdown_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        Ok(())
    }
}

/// Drive one claimed task through the Executor while a heartbeat timer keeps
/// `last_heartbeat` fresh; stops the heartbeat the instant the Executor
/// finishes (§4.4 per-task execution). The Executor has already written the
/// task's terminal fields by the time this returns.
async fn run_one(
    pool: PgPool,
    recorder: Arc<dyn RecorderAdapter>,
    executor_config: ExecutorConfig,
    heartbeat_interval: Duration,
    task: RecordingTask,
) {
    let task_id = task.task_id;
    let exec_fut = acap_executor::run_claimed_task(&pool, recorder, &executor_config, &task);
    tokio::pin!(exec_fut);

    let mut ticker = tokio::time::interval(heartbeat_interval);
    ticker.tick().await; // first tick fires immediately; claim already set last_heartbeat

    loop {
        tokio::select! {
            result = &mut exec_fut => {
                if let Err(err) = result {
                    tracing::warn!(%task_id, error = %format!("{err:#}"), "executor task errored");
                }
                return;
            }
            _ = ticker.tick() => {
                if let Err(err) = acap_db::heartbeat_recording_task(&pool, task_id).await {
                    tracing::warn!(%task_id, error = %format!("{err:#}"), "heartbeat failed");
                }
            }
        }
    }
}
