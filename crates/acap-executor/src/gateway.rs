//! Recorder Gateway — the SINGLE choke-point for all Recorder invocations.
//!
//! # Invariant
//!
//! `RecorderGateway::invoke` is the only public entry point that can reach a
//! `RecorderAdapter`. It enforces the task deadline via `tokio::time::timeout`
//! and always calls `close()` afterward — on success, failure, *and* timeout —
//! so no caller can bypass the deadline/cleanup contract by calling the
//! adapter directly (mirrors the teacher's `BrokerGateway`, which is the only
//! surface able to reach a `BrokerAdapter`).

use std::sync::Arc;
use std::time::Duration;

use acap_recorder::{RecorderAdapter, RecorderRequest, RecorderResult};

/// Outcome of one gateway-mediated Recorder invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderOutcome {
    Returned(RecorderResult),
    DeadlineExceeded,
}

pub struct RecorderGateway {
    recorder: Arc<dyn RecorderAdapter>,
}

impl RecorderGateway {
    pub fn new(recorder: Arc<dyn RecorderAdapter>) -> Self {
        Self { recorder }
    }

    /// Drive one recording session under `deadline`. Always releases the
    /// Recorder's resources before returning, regardless of which branch is
    /// taken (§4.3 step 7).
    pub async fn invoke(&self, req: RecorderRequest, deadline: Duration) -> RecorderOutcome {
        let outcome = match tokio::time::timeout(deadline, self.recorder.build(req)).await {
            Ok(result) => RecorderOutcome::Returned(result),
            Err(_) => RecorderOutcome::DeadlineExceeded,
        };
        self.recorder.close().await;
        outcome
    }
}
