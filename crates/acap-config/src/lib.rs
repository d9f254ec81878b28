//! Layered YAML configuration loading, canonicalization, and hashing.
//!
//! Config layers are read in order and deep-merged (later layers win), then
//! canonicalized (object keys sorted recursively) and SHA-256 hashed so two
//! equivalent configs always produce the same hash regardless of key order
//! or whitespace. The hash is logged at startup so operators can tell which
//! config a running process actually loaded.

pub mod consumption;
pub mod secrets;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub use consumption::{consumed_pointers, ConfigMode};

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut contents = Vec::with_capacity(paths.len());
    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        contents.push(s);
    }
    let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

/// Same as [`load_layered_yaml`] but takes YAML source strings directly,
/// which is what the test suite and `acap-testkit` scenarios use.
pub fn load_layered_yaml_from_strings(layers: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for (i, s) in layers.iter().enumerate() {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(s).with_context(|| format!("parse yaml layer {i}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        reject_embedded_secrets(&json_val, "")?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Reject any string value that looks like a literal secret rather than an
/// environment-variable NAME. Config files store variable names only; the
/// actual value is resolved from the process environment at startup (see
/// [`secrets`]).
fn reject_embedded_secrets(v: &Value, path: &str) -> Result<()> {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                reject_embedded_secrets(child, &format!("{path}/{k}"))?;
            }
        }
        Value::Array(arr) => {
            for (i, child) in arr.iter().enumerate() {
                reject_embedded_secrets(child, &format!("{path}[{i}]"))?;
            }
        }
        Value::String(s) => {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED at {path}: literal secret values are not allowed in config files, use an env var NAME instead");
            }
        }
        _ => {}
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    s.starts_with("sk-")
        || s.starts_with("AKIA")
        || s.contains("-----BEGIN")
        || s.starts_with("Bearer ")
}

/// Enumerated, defaulted configuration for the Orchestrator (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_concurrent_builds: u32,
    pub build_poll_interval_seconds: u64,
    pub build_stale_timeout_minutes: i64,
    pub metrics_interval_seconds: u64,
    pub shutdown_timeout_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_builds: 5,
            build_poll_interval_seconds: 5,
            build_stale_timeout_minutes: 15,
            metrics_interval_seconds: 30,
            shutdown_timeout_seconds: 60,
        }
    }
}

/// Enumerated, defaulted configuration for the Build Runner (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildRunnerConfig {
    pub check_interval_seconds: u64,
    pub max_attempts: u32,
}

impl Default for BuildRunnerConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: 5,
            max_attempts: 3,
        }
    }
}

/// Enumerated, defaulted configuration for the Recording Queue Worker (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueWorkerConfig {
    pub concurrency: u32,
    pub idle_wait_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub stale_timeout_minutes: i64,
    pub max_attempts: u32,
    pub task_timeout_minutes: i64,
}

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            idle_wait_ms: 1000,
            heartbeat_interval_ms: 5000,
            stale_timeout_minutes: 15,
            max_attempts: 3,
            task_timeout_minutes: 10,
        }
    }
}

/// Top-level configuration covering every component, validated once at
/// process start by `acap-daemon`/`acap-cli`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AcapConfig {
    pub orchestrator: OrchestratorConfig,
    pub build_runner: BuildRunnerConfig,
    pub queue_worker: QueueWorkerConfig,
}

impl AcapConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        serde_json::from_value(loaded.config_json.clone())
            .context("config did not match AcapConfig shape")
    }

    /// Basic sanity checks beyond what serde's defaulting gives us.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_concurrent_builds == 0 {
            bail!("orchestrator.max_concurrent_builds must be >= 1");
        }
        if self.queue_worker.concurrency == 0 {
            bail!("queue_worker.concurrency must be >= 1");
        }
        if self.build_runner.max_attempts == 0 {
            bail!("build_runner.max_attempts must be >= 1");
        }
        if self.queue_worker.max_attempts == 0 {
            bail!("queue_worker.max_attempts must be >= 1");
        }
        Ok(())
    }
}

/// Policy for how [`consumption::report_unused_keys`] reacts to config keys
/// nobody reads — catches typos and stale options surviving a rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}
