//! Build Runner (§4.2): the per-build-job lifecycle. Generates recording-
//! tasks idempotently, polls them to drain, retries failures up to
//! `max_attempts`, publishes a new site-version on success, and terminates
//! the build-job.
//!
//! A `BuildJob` arrives already transitioned to `(action_build, running)` by
//! the Orchestrator's claim; this crate owns everything from there.

mod runner;

pub use runner::{generate_recording_tasks, publish, run, PollOutcome};
