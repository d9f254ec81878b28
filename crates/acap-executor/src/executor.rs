//! Recording Executor (§4.3): runs one claimed recording-task to completion.
//! The Executor is the sole writer of a task's terminal fields.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use acap_recorder::{RecorderAdapter, RecorderRequest};
use acap_schemas::RecordingTask;
use serde_json::Value;
use sqlx::PgPool;

use crate::gateway::{RecorderGateway, RecorderOutcome};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub task_timeout_minutes: i64,
    /// When set, completed capabilities are additionally mirrored to
    /// `exports/<site_id>/<build_id>/<chunk_id>.json` (§4.8). `None` skips
    /// filesystem export and persists only to the Store.
    pub exports_root: Option<std::path::PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            task_timeout_minutes: 10,
            exports_root: None,
        }
    }
}

/// Count discovered interactive elements across a capability payload: pages'
/// `interactive_elements` arrays plus any top-level `global_elements` array
/// (§4.3 step 4). Purely informational — logged, not persisted separately.
pub fn count_capability_elements(capability: &Value) -> usize {
    let mut count = 0;
    if let Some(pages) = capability.get("pages").and_then(Value::as_object) {
        for page in pages.values() {
            if let Some(elements) = page.get("interactive_elements").and_then(Value::as_array) {
                count += elements.len();
            }
        }
    }
    if let Some(global) = capability.get("global_elements").and_then(Value::as_array) {
        count += global.len();
    }
    count
}

/// Run one claimed recording-task to completion against the Store, writing
/// its terminal fields on every exit path. Never returns `Err` for a task
/// outcome — only for Store I/O failure, which the caller (Queue Worker)
/// logs and retries on the next poll.
pub async fn run_claimed_task(
    pool: &PgPool,
    recorder: Arc<dyn RecorderAdapter>,
    config: &ExecutorConfig,
    task: &RecordingTask,
) -> anyhow::Result<()> {
    // Step 1: validate inputs. chunk_id is a non-null Uuid (foreign key,
    // NOT NULL) so it can't arrive empty; start_url is the one field that
    // legitimately can, so that's what's validated here.
    if task.start_url.trim().is_empty() {
        acap_db::fail_recording_task(pool, task.task_id, "start_url is required").await?;
        return Ok(());
    }

    // Step 2: load the expanded chunk (chunk <-> document <-> site JOIN).
    let expanded = match acap_db::fetch_expanded_chunk(pool, task.chunk_id).await {
        Ok(expanded) => expanded,
        Err(err) => {
            acap_db::fail_recording_task(pool, task.task_id, &format!("{err:#}")).await?;
            return Ok(());
        }
    };

    let chunk_type = task
        .config
        .get("chunk_type")
        .and_then(Value::as_str)
        .unwrap_or("task_driven");

    let req = RecorderRequest {
        start_url: origin_of(&expanded.base_url),
        scenario_name: chunk_type.to_string(),
        site_name: expanded.site_name.clone(),
        chunk_content: expanded.content.clone(),
        system_prompt: default_system_prompt(),
        user_prompt: expanded.content.clone(),
        task_id: task.task_id.to_string(),
    };

    let gateway = RecorderGateway::new(recorder);
    let deadline = Duration::from_secs((config.task_timeout_minutes.max(0) as u64) * 60);

    // Step 3: invoke the Recorder under a hard deadline.
    let started = std::time::Instant::now();
    let outcome = gateway.invoke(req, deadline).await;
    let duration_ms = started.elapsed().as_millis() as i64;

    match outcome {
        RecorderOutcome::Returned(result) if result.success => {
            // Step 4: persist capability, mark completed.
            let capability = result.site_capability.unwrap_or(Value::Null);
            let elements = count_capability_elements(&capability);
            tracing::info!(task_id = %task.task_id, elements, "recording task completed");

            acap_db::write_chunk_capability(pool, task.chunk_id, &capability).await?;
            if let Some(root) = &config.exports_root {
                persist_capability_export(root, task, &capability)?;
            }

            let tokens_used = result.tokens.map(|t| t.total);
            let partial_note = result.partial_result.then_some(result.message).flatten();

            acap_db::complete_recording_task(
                pool,
                task.task_id,
                duration_ms,
                tokens_used,
                partial_note.as_deref(),
            )
            .await?;
        }
        RecorderOutcome::Returned(result) => {
            // Step 5: Recorder reported failure.
            let message = result.message.unwrap_or_else(|| "recorder reported failure".to_string());
            acap_db::fail_recording_task(pool, task.task_id, &message).await?;
        }
        RecorderOutcome::DeadlineExceeded => {
            // Step 6: deadline exceeded with no partial result to fall back on.
            acap_db::fail_recording_task(
                pool,
                task.task_id,
                &format!("task exceeded deadline of {} minutes", config.task_timeout_minutes),
            )
            .await?;
        }
    }

    Ok(())
}

fn persist_capability_export(
    exports_root: &Path,
    task: &RecordingTask,
    capability: &Value,
) -> anyhow::Result<()> {
    let init = acap_artifacts::init_capability_artifact(exports_root, task.site_id, task.build_id)?;
    acap_artifacts::write_capability_artifact(&init.build_dir, task.chunk_id, capability)?;
    Ok(())
}

fn origin_of(base_url: &str) -> String {
    match url::Url::parse(base_url) {
        Ok(url) => format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()),
        Err(_) => base_url.to_string(),
    }
}

fn default_system_prompt() -> String {
    "You are a browser automation agent. Explore the given page and record \
     every interactive element needed to complete the described action."
        .to_string()
}
