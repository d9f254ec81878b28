//! The Recorder collaborator contract (§4.3, §6): `build` drives one browser
//! session against a single chunk and returns a capability artifact plus
//! metrics; `close` releases every resource the session held. The scheduler
//! treats a real Recorder as an opaque, deadline-bound async call — this
//! crate defines that boundary and ships a deterministic in-memory mock for
//! tests and local development. It is not a substitute for the real
//! collaborator (LLM-driven browser agent, selector extraction, report
//! rendering — all explicitly out of scope, see spec Non-goals).

pub mod types;

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::json;

pub use types::{RecorderRequest, RecorderResult, TokenUsage};

/// Trait every Recorder implementation must satisfy. Implementations handle
/// the actual browser-agent session (real adapter) or a deterministic
/// in-memory stand-in (`MockRecorder`), remaining opaque to the Executor.
#[async_trait::async_trait]
pub trait RecorderAdapter: Send + Sync {
    /// Drive one recording session. Callers are responsible for enforcing
    /// the task deadline via `tokio::time::timeout`; this method itself does
    /// not time out.
    async fn build(&self, req: RecorderRequest) -> RecorderResult;

    /// Release all resources held by this Recorder instance (browser,
    /// logs). Called exactly once per task, on every exit path.
    async fn close(&self);
}

/// Deterministic in-memory Recorder.
///
/// Design decisions (kept intentionally simple/deterministic, mirroring the
/// teacher's paper-broker adapter):
/// - No randomness, no wall-clock reads.
/// - The returned `site_capability` is derived solely from `req.task_id` and
///   `req.start_url`, so the same request always produces the same result.
/// - `close` records that it was called, for assertions in tests that verify
///   the Executor always closes the Recorder on every exit path.
#[derive(Debug, Default)]
pub struct MockRecorder {
    closed: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl MockRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_closed(&self) -> bool {
        *self.closed.lock().expect("mock recorder lock poisoned")
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock recorder lock poisoned").len()
    }
}

#[async_trait::async_trait]
impl RecorderAdapter for MockRecorder {
    async fn build(&self, req: RecorderRequest) -> RecorderResult {
        self.calls
            .lock()
            .expect("mock recorder lock poisoned")
            .push(req.task_id.clone());

        let mut pages = BTreeMap::new();
        pages.insert(
            req.start_url.clone(),
            json!({
                "interactive_elements": [
                    {"selector": format!("#action-{}", req.task_id), "label": "primary action"}
                ]
            }),
        );

        RecorderResult {
            success: true,
            partial_result: false,
            site_capability: Some(json!({ "pages": pages })),
            turns: Some(1),
            tokens: Some(TokenUsage {
                input: 100,
                output: 50,
                total: 150,
            }),
            saved_path: None,
            message: None,
        }
    }

    async fn close(&self) {
        *self.closed.lock().expect("mock recorder lock poisoned") = true;
    }
}

/// A `MockRecorder` that always fails `build`, for exercising the Executor's
/// failure path deterministically.
#[derive(Debug, Default)]
pub struct AlwaysFailRecorder {
    closed: Mutex<bool>,
}

impl AlwaysFailRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_closed(&self) -> bool {
        *self.closed.lock().expect("mock recorder lock poisoned")
    }
}

#[async_trait::async_trait]
impl RecorderAdapter for AlwaysFailRecorder {
    async fn build(&self, _req: RecorderRequest) -> RecorderResult {
        RecorderResult::failed("mock recorder: simulated failure")
    }

    async fn close(&self) {
        *self.closed.lock().expect("mock recorder lock poisoned") = true;
    }
}

/// A `MockRecorder` that never returns, for exercising the Executor's
/// deadline-enforcement path deterministically under `tokio::time::timeout`.
#[derive(Debug, Default)]
pub struct HangingRecorder;

impl HangingRecorder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl RecorderAdapter for HangingRecorder {
    async fn build(&self, _req: RecorderRequest) -> RecorderResult {
        std::future::pending::<()>().await;
        unreachable!("hanging recorder never resolves");
    }

    async fn close(&self) {}
}
