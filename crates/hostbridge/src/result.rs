use std::time::Duration;

use serde::Serialize;

/// Outcome of running one snippet.
///
/// `output` and `stderr` hold whatever was written before the snippet
/// finished, including when `failure` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub value: Option<serde_json::Value>,
    pub output: String,
    pub stderr: String,
    pub failure: Option<Failure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub message: String,
    pub trace: String,
}

impl ExecutionResult {
    #[must_use]
    pub fn failed(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            failure: Some(Failure {
                message: message.into(),
                trace: trace.into(),
            }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn timed_out(timeout: Duration) -> Self {
        let message = format!("Execution timed out after {}s", timeout.as_secs());
        let trace = format!(
            "{message}; the snippet stays queued and may still run on the privileged context"
        );
        Self::failed(message, trace)
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}
