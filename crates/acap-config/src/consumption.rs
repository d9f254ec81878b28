//! Registry of which config subtrees each component actually reads.
//!
//! Kept separate from the components themselves so [`report_unused_keys`]
//! can flag config sections that nobody consumes — usually a typo or a
//! leftover key from a renamed option.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::UnusedKeyPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    Orchestrator,
    BuildRunner,
    QueueWorker,
}

pub fn consumed_pointers(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        ConfigMode::Orchestrator => ORCHESTRATOR,
        ConfigMode::BuildRunner => BUILD_RUNNER,
        ConfigMode::QueueWorker => QUEUE_WORKER,
    }
}

static ORCHESTRATOR: &[&str] = &[
    "/orchestrator/max_concurrent_builds",
    "/orchestrator/build_poll_interval_seconds",
    "/orchestrator/build_stale_timeout_minutes",
    "/orchestrator/metrics_interval_seconds",
    "/orchestrator/shutdown_timeout_seconds",
];

static BUILD_RUNNER: &[&str] = &[
    "/build_runner/check_interval_seconds",
    "/build_runner/max_attempts",
];

static QUEUE_WORKER: &[&str] = &[
    "/queue_worker/concurrency",
    "/queue_worker/idle_wait_ms",
    "/queue_worker/heartbeat_interval_ms",
    "/queue_worker/stale_timeout_minutes",
    "/queue_worker/max_attempts",
    "/queue_worker/task_timeout_minutes",
];

#[derive(Debug, Clone, Default)]
pub struct UnusedKeyReport {
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Walk every leaf in `config_json` and flag leaves whose pointer is not in
/// the consumed registry for `mode`. `Warn` returns the report; `Fail`
/// returns an error naming the first offending pointer set.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed = consumed_pointers(mode);
    let mut unused = Vec::new();
    collect_unused_leaves(config_json, "", consumed, &mut unused);
    unused.sort();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} config key(s) not consumed by {:?}: {}",
            report.unused_leaf_pointers.len(),
            mode,
            report.unused_leaf_pointers.join(", "),
        );
    }

    Ok(report)
}

fn collect_unused_leaves(v: &Value, path: &str, consumed: &[&str], out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                collect_unused_leaves(child, &format!("{path}/{k}"), consumed, out);
            }
        }
        _ => {
            if !consumed.contains(&path) {
                out.push(path.to_string());
            }
        }
    }
}
