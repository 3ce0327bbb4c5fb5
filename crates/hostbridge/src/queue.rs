use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{ExecutionResult, Executor, host::Scheduler};

/// Delay the drain callback asks for before its next invocation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Write-once result slot paired with the signal its submitter waits on.
#[derive(Default)]
pub struct Completion {
    slot: Mutex<Option<ExecutionResult>>,
    filled: AtomicBool,
    signal: Condvar,
}

impl Completion {
    /// Returns `false` if the slot had already been filled.
    fn fill(&self, result: ExecutionResult) -> bool {
        if self.filled.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.slot.lock() = Some(result);
        self.signal.notify_all();
        true
    }

    /// A `timeout` too large to form a deadline waits without one.
    fn wait(&self, timeout: Duration) -> Option<ExecutionResult> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.slot.lock();
        while slot.is_none() {
            match deadline {
                Some(deadline) => {
                    if self.signal.wait_until(&mut slot, deadline).timed_out() {
                        break;
                    }
                }
                None => self.signal.wait(&mut slot),
            }
        }
        slot.take()
    }
}

/// A snippet waiting for the privileged context. Owned by the queue, so it
/// can be popped, and therefore run, only once.
struct PendingExecution {
    id: u64,
    code: String,
    completion: Arc<Completion>,
}

/// The submitter's side of a queued snippet.
pub struct Ticket {
    id: u64,
    completion: Arc<Completion>,
}

impl Ticket {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until the privileged context filled the result or `timeout`
    /// elapsed. A late result is dropped with the completion.
    #[must_use]
    pub fn wait(self, timeout: Duration) -> Option<ExecutionResult> {
        self.completion.wait(timeout)
    }
}

/// Hands snippets from any thread to the single privileged context.
#[derive(Default)]
pub struct DispatchQueue {
    items: Mutex<VecDeque<PendingExecution>>,
    registered: AtomicBool,
    next_id: AtomicU64,
}

impl DispatchQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, code: impl Into<String>) -> Ticket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let completion = Arc::new(Completion::default());
        self.items.lock().push_back(PendingExecution {
            id,
            code: code.into(),
            completion: completion.clone(),
        });
        tracing::debug!(id, "execution queued");
        Ticket { id, completion }
    }

    /// Runs at most one queued snippet. Must only be called on the
    /// privileged context; the lock is released before `executor` runs.
    pub fn drain_one(&self, executor: &Executor) -> Duration {
        let Some(pending) = self.items.lock().pop_front() else {
            return POLL_INTERVAL;
        };

        let started = Instant::now();
        let result = executor.run(&pending.code);
        tracing::debug!(
            id = pending.id,
            elapsed_ms = started.elapsed().as_millis(),
            failed = result.is_failure(),
            "execution drained"
        );
        if !pending.completion.fill(result) {
            tracing::warn!(id = pending.id, "execution completed twice");
        }
        POLL_INTERVAL
    }

    /// Attaches [`Self::drain_one`] to `scheduler` once per queue. Must be
    /// called on the privileged context; returns whether this call did it.
    pub fn ensure_registered<S>(self: &Arc<Self>, scheduler: &S, executor: Executor) -> bool
    where
        S: Scheduler + ?Sized,
    {
        if self
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let queue = Arc::clone(self);
        scheduler.register(Box::new(move || queue.drain_one(&executor)));
        tracing::info!("main thread executor registered");
        true
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
