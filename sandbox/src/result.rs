use codepad_system::RunStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const NO_OUTPUT: &str = "Execution completed with no output";

/// Uniform outcome of one run, whatever strategy produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: RunStatus,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn completed(output: String, elapsed: Duration) -> Self {
        let output = if output.is_empty() {
            NO_OUTPUT.to_owned()
        } else {
            output
        };
        Self {
            output,
            error: None,
            status: RunStatus::Completed,
            duration_ms: millis(elapsed),
        }
    }

    /// Partial output produced before the failure is kept.
    pub fn failed(status: RunStatus, output: String, error: String, elapsed: Duration) -> Self {
        Self {
            output,
            error: Some(error),
            status,
            duration_ms: millis(elapsed),
        }
    }

    pub fn unavailable(language: &str) -> Self {
        Self::failed(
            RunStatus::Unavailable,
            String::new(),
            format!("Execution is not available for {} yet.", language),
            Duration::default(),
        )
    }

    pub fn timed_out(output: String, budget: Duration, elapsed: Duration) -> Self {
        Self::failed(
            RunStatus::TimedOut,
            output,
            format!("Execution timed out after {}ms", millis(budget)),
            elapsed,
        )
    }

    pub fn cancelled(output: String, elapsed: Duration) -> Self {
        Self::failed(
            RunStatus::Cancelled,
            output,
            "Execution was cancelled".to_owned(),
            elapsed,
        )
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
