//! Recording Executor: runs one claimed recording-task end to end, the
//! Recorder invocation mediated exclusively through `RecorderGateway` so no
//! other crate can bypass the deadline/outcome-writing contract (§4.3).

mod executor;
mod gateway;

pub use executor::{count_capability_elements, run_claimed_task, ExecutorConfig};
pub use gateway::{RecorderGateway, RecorderOutcome};
