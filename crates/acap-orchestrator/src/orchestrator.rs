//! The main claim-and-spawn loop (§4.5).

use std::time::Duration;

use acap_config::{BuildRunnerConfig, OrchestratorConfig, QueueWorkerConfig};
use acap_queue::{QueueWorker, RecorderFactory};
use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::metrics::spawn_metrics_emitter;

pub struct Orchestrator {
    pool: PgPool,
    config: OrchestratorConfig,
    build_runner_config: BuildRunnerConfig,
    queue_worker_config: QueueWorkerConfig,
    recorder_factory: RecorderFactory,
    exports_root: Option<std::path::PathBuf>,
}

impl Orchestrator {
    pub fn new(
        pool: PgPool,
        config: OrchestratorConfig,
        build_runner_config: BuildRunnerConfig,
        queue_worker_config: QueueWorkerConfig,
        recorder_factory: RecorderFactory,
    ) -> Self {
        Self {
            pool,
            config,
            build_runner_config,
            queue_worker_config,
            recorder_factory,
            exports_root: None,
        }
    }

    pub fn with_exports_root(mut self, root: std::path::PathBuf) -> Self {
        self.exports_root = Some(root);
        self
    }

    /// Run until `stop_rx` reports `true` (§4.5 Lifecycle + Graceful
    /// shutdown). On return, the Queue Worker has been stopped and every
    /// in-flight Build Runner has either finished or been abandoned past its
    /// own shutdown deadline (self-healed by stale-build recovery on the
    /// next claim, here or on another process).
    pub async fn run(&self, mut stop_rx: watch::Receiver<bool>) -> Result<()> {
        let shutdown_timeout = Duration::from_secs(self.config.shutdown_timeout_seconds);

        // Step 1: start the Queue Worker in the background.
        let mut queue_worker = QueueWorker::new(
            self.pool.clone(),
            self.queue_worker_config.clone(),
            self.recorder_factory.clone(),
        );
        if let Some(root) = &self.exports_root {
            queue_worker = queue_worker.with_exports_root(root.clone());
        }
        let (queue_stop_tx, queue_stop_rx) = watch::channel(false);
        let queue_handle = tokio::spawn(async move { queue_worker.run(queue_stop_rx, shutdown_timeout).await });

        // Step 2: start the periodic metrics emitter.
        let metrics_handle = spawn_metrics_emitter(
            self.pool.clone(),
            Duration::from_secs(self.config.metrics_interval_seconds),
            self.config.max_concurrent_builds,
            self.queue_worker_config.concurrency,
            stop_rx.clone(),
        );

        // Step 3: main claim loop.
        let mut in_flight: JoinSet<Result<()>> = JoinSet::new();
        let poll_interval = Duration::from_secs(self.config.build_poll_interval_seconds.max(1));

        loop {
            if *stop_rx.borrow() {
                break;
            }

            while in_flight.len() < self.config.max_concurrent_builds as usize {
                if *stop_rx.borrow() {
                    break;
                }
                match acap_db::claim_build_job(&self.pool, self.config.build_stale_timeout_minutes).await? {
                    Some(build) => {
                        let pool = self.pool.clone();
                        let build_runner_config = self.build_runner_config.clone();
                        let build_id = build.build_id;
                        tracing::info!(%build_id, site_id = %build.site_id, "claimed build-job");
                        in_flight.spawn(async move { acap_build::run(&pool, &build_runner_config, build).await });
                    }
                    None => break,
                }
            }

            if in_flight.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = stop_rx.changed() => {}
                }
            } else {
                tokio::select! {
                    Some(result) = in_flight.join_next() => {
                        log_build_outcome(result);
                    }
                    _ = stop_rx.changed() => {}
                }
            }
        }

        // Step 4 (graceful shutdown): drain in-flight Build Runners up to the
        // shutdown deadline; anything left is self-healed by the stale-build
        // recovery rule on the next claim (§4.4/§4.5).
        let _ = tokio::time::timeout(shutdown_timeout, async {
            while let Some(result) = in_flight.join_next().await {
                log_build_outcome(result);
            }
        })
        .await;

        let _ = queue_stop_tx.send(true);
        let _ = queue_handle.await;
        metrics_handle.abort();

        Ok(())
    }
}

fn log_build_outcome(result: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %format!("{err:#}"), "build-job run ended in error"),
        Err(join_err) => tracing::error!(error = %join_err, "build-job task panicked"),
    }
}
