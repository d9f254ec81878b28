//! Capability artifact persistence (§4.8). The Recording Executor's sole
//! write of a completed task's `site_capability` is to the Store's
//! `chunk.site_capability` column (see `acap_db::write_chunk_capability`);
//! this crate additionally mirrors that payload to an `exports/` file tree,
//! giving operators a manifest-style audit trail of what the Recorder
//! produced per chunk without requiring a separate reporting service —
//! the same role the teacher's `init_run_artifacts`/run-manifest writer
//! plays for backtest runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    pub schema_version: i32,
    pub site_id: Uuid,
    pub build_id: Uuid,
    pub created_at_utc: DateTime<Utc>,
    /// chunk_id -> relative path of its capability file, accumulated as
    /// chunks complete. Keyed by string for stable JSON map ordering.
    pub chunks: BTreeMap<String, String>,
}

pub struct InitCapabilityArtifactResult {
    pub build_dir: PathBuf,
    pub manifest_path: PathBuf,
}

/// Create `exports/<site_id>/<build_id>/` and seed an empty manifest if one
/// doesn't already exist. Idempotent: re-running against an existing build
/// directory leaves prior capability files and manifest entries intact.
pub fn init_capability_artifact(
    exports_root: &Path,
    site_id: Uuid,
    build_id: Uuid,
) -> Result<InitCapabilityArtifactResult> {
    let build_dir = exports_root.join(site_id.to_string()).join(build_id.to_string());
    fs::create_dir_all(&build_dir)
        .with_context(|| format!("create exports dir failed: {}", build_dir.display()))?;

    let manifest_path = build_dir.join("manifest.json");
    let lock = manifest_lock_for(&build_dir);
    let _guard = lock.lock().expect("manifest lock poisoned");
    if !manifest_path.exists() {
        let manifest = BuildManifest {
            schema_version: 1,
            site_id,
            build_id,
            created_at_utc: Utc::now(),
            chunks: BTreeMap::new(),
        };
        write_manifest(&manifest_path, &manifest)?;
    }

    Ok(InitCapabilityArtifactResult {
        build_dir,
        manifest_path,
    })
}

/// Write one chunk's capability to `<chunk_id>.json` under the build
/// directory and record it in the manifest. Overwrites any prior file for
/// the same chunk — the latest completed attempt wins, matching the Store's
/// `write_chunk_capability` semantics.
///
/// The manifest's read-modify-write is serialized per `build_dir` via an
/// in-process mutex: the Queue Worker runs up to `concurrency` executors in
/// parallel, all potentially writing into the same build's manifest, and an
/// unguarded read/insert/write would let one completion's entry clobber
/// another's.
pub fn write_capability_artifact(
    build_dir: &Path,
    chunk_id: Uuid,
    capability: &Value,
) -> Result<PathBuf> {
    let file_name = format!("{chunk_id}.json");
    let chunk_path = build_dir.join(&file_name);
    let json = serde_json::to_string_pretty(capability).context("serialize capability failed")?;
    fs::write(&chunk_path, format!("{json}\n"))
        .with_context(|| format!("write capability artifact failed: {}", chunk_path.display()))?;

    let manifest_path = build_dir.join("manifest.json");
    let lock = manifest_lock_for(build_dir);
    let _guard = lock.lock().expect("manifest lock poisoned");
    let mut manifest = read_manifest(&manifest_path)?;
    manifest.chunks.insert(chunk_id.to_string(), file_name);
    write_manifest(&manifest_path, &manifest)?;

    Ok(chunk_path)
}

/// Per-build-directory mutex registry, so two callers naming the same
/// build directory serialize on the same lock within this process.
fn manifest_lock_for(build_dir: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let registry = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registry.lock().expect("manifest lock registry poisoned");
    map.entry(build_dir.to_path_buf()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
}

fn read_manifest(path: &Path) -> Result<BuildManifest> {
    let bytes = fs::read(path).with_context(|| format!("read manifest failed: {}", path.display()))?;
    serde_json::from_slice(&bytes).context("parse manifest failed")
}

fn write_manifest(path: &Path, manifest: &BuildManifest) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest).context("serialize manifest failed")?;
    fs::write(path, format!("{json}\n")).with_context(|| format!("write manifest failed: {}", path.display()))
}
