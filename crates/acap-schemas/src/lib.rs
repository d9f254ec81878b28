//! Shared domain types for the action-capability build scheduler.
//!
//! These mirror the Store's tables directly (§3 of the design doc) and carry
//! no behavior of their own — every state transition lives in `acap-db`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteVersionStatus {
    Building,
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    KnowledgeBuild,
    ActionBuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    TaskDriven,
    Exploratory,
}

impl SiteVersionStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            SiteVersionStatus::Building => "building",
            SiteVersionStatus::Active => "active",
            SiteVersionStatus::Archived => "archived",
        }
    }
}

impl BuildStage {
    pub fn as_db_str(self) -> &'static str {
        match self {
            BuildStage::KnowledgeBuild => "knowledge_build",
            BuildStage::ActionBuild => "action_build",
        }
    }
}

impl StageStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Error => "error",
        }
    }
}

impl TaskStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub site_id: Uuid,
    pub domain: String,
    pub base_url: String,
    pub app_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteVersion {
    pub version_id: Uuid,
    pub site_id: Uuid,
    pub version_number: i64,
    pub status: String,
    pub commit_message: Option<String>,
    pub created_by: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: Uuid,
    pub site_id: Uuid,
    pub source_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub site_capability: Option<Value>,
}

/// A chunk joined with its parent document and site, the shape the
/// Recording Executor needs to build a Recorder request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandedChunk {
    pub chunk_id: Uuid,
    pub content: String,
    pub source_url: String,
    pub site_id: Uuid,
    pub site_name: String,
    pub base_url: String,
    pub app_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub build_id: Uuid,
    pub site_id: Uuid,
    pub stage: String,
    pub stage_status: String,
    pub knowledge_started_at: Option<DateTime<Utc>>,
    pub knowledge_completed_at: Option<DateTime<Utc>>,
    pub action_started_at: Option<DateTime<Utc>>,
    pub action_completed_at: Option<DateTime<Utc>>,
    pub config: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingTask {
    pub task_id: Uuid,
    pub build_id: Uuid,
    pub site_id: Uuid,
    pub chunk_id: Uuid,
    pub start_url: String,
    pub status: String,
    pub progress: i32,
    pub attempt_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub tokens_used: Option<i64>,
    pub error_message: Option<String>,
    pub config: Value,
    pub updated_at: DateTime<Utc>,
}

/// Count of recording-tasks per status for one build, used by the Build
/// Runner's poll loop and the Orchestrator's metrics emitter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskStatusCounts {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

impl TaskStatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.running + self.completed + self.failed
    }
}
