use serde_json::Value;

/// Everything the Recorder needs to drive one recording session (§4.3 step 3,
/// §6 collaborator contract). `chunk_type` steers the Recorder's internal
/// prompt selection but is otherwise opaque to the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct RecorderRequest {
    pub start_url: String,
    pub scenario_name: String,
    pub site_name: String,
    pub chunk_content: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub task_id: String,
}

/// Token accounting the Recorder reports back, passed through to
/// `recording_task.tokens_used` verbatim as `total`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: i64,
    pub output: i64,
    pub total: i64,
}

/// The Recorder's response to `build` (§6 collaborator contract). `success`
/// and `partial_result` are independent: a deadline hit with an interim save
/// reports `success = false, partial_result = true`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecorderResult {
    pub success: bool,
    pub partial_result: bool,
    pub site_capability: Option<Value>,
    pub turns: Option<i64>,
    pub tokens: Option<TokenUsage>,
    pub saved_path: Option<String>,
    pub message: Option<String>,
}

impl RecorderResult {
    pub fn ok(site_capability: Value) -> Self {
        Self {
            success: true,
            site_capability: Some(site_capability),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}
