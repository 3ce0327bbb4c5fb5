use std::{sync::Arc, time::Duration};

use crate::{DispatchQueue, ExecutionResult, Executor};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Entry point for running snippets from any thread.
///
/// While the queue has a registered drain callback, snippets are handed to
/// the privileged context and the caller parks until the result arrives or
/// the timeout elapses. Without one (standalone process, or the host never
/// attached) the snippet runs right here with no capability bound.
#[derive(Clone)]
pub struct ExecutionBridge {
    queue: Arc<DispatchQueue>,
    timeout: Duration,
}

impl ExecutionBridge {
    #[must_use]
    pub const fn new(queue: Arc<DispatchQueue>, timeout: Duration) -> Self {
        Self { queue, timeout }
    }

    /// Blocks the calling thread; call from a blocking context.
    #[must_use]
    pub fn execute(&self, code: &str) -> ExecutionResult {
        if !self.queue.is_registered() {
            tracing::debug!("no privileged context attached, executing in place");
            return Executor::new().run(code);
        }

        let ticket = self.queue.submit(code);
        let id = ticket.id();
        ticket.wait(self.timeout).unwrap_or_else(|| {
            tracing::warn!(
                id,
                timeout_secs = self.timeout.as_secs(),
                "execution timed out waiting for the privileged context"
            );
            ExecutionResult::timed_out(self.timeout)
        })
    }
}
