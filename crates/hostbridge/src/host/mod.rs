//! The embedding host's side of the bridge.
//!
//! A host only has to offer "call me periodically on your main thread",
//! modelled by [`Scheduler`]. [`HostLoop`] is a minimal host of that shape
//! for processes that have no event loop of their own.

mod scene;

use std::{
    cell::RefCell,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

pub use scene::Scene;

/// Longest sleep between ticks when no callback is registered.
const IDLE_WAIT: Duration = Duration::from_millis(50);

pub trait Scheduler {
    /// Invokes `callback` repeatedly on the privileged context, waiting the
    /// returned duration between invocations.
    fn register(&self, callback: Box<dyn FnMut() -> Duration>);
}

struct Timer {
    due: Instant,
    callback: Box<dyn FnMut() -> Duration>,
}

/// Single-threaded cooperative timer loop. Whatever thread calls
/// [`HostLoop::run`] becomes the privileged context.
#[derive(Default)]
pub struct HostLoop {
    timers: RefCell<Vec<Timer>>,
    stop: StopHandle,
}

impl HostLoop {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Invokes every due callback once and returns the wait until the next
    /// one is due.
    pub fn run_once(&self) -> Duration {
        let mut timers = std::mem::take(&mut *self.timers.borrow_mut());
        let now = Instant::now();
        for timer in &mut timers {
            if timer.due <= now {
                let delay = (timer.callback)();
                timer.due = Instant::now() + delay;
            }
        }

        // callbacks may have registered new timers meanwhile
        let mut registered = self.timers.borrow_mut();
        timers.append(&mut registered);
        *registered = timers;

        let now = Instant::now();
        registered
            .iter()
            .map(|timer| timer.due.saturating_duration_since(now))
            .min()
            .map_or(IDLE_WAIT, |wait| wait.min(IDLE_WAIT))
    }

    /// Ticks until [`StopHandle::stop`] is called.
    pub fn run(&self) {
        tracing::info!("host loop running");
        while !self.stop.is_stopped() {
            let wait = self.run_once();
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
        }
        tracing::info!("host loop stopped");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.borrow().is_empty()
    }
}

impl Scheduler for HostLoop {
    fn register(&self, callback: Box<dyn FnMut() -> Duration>) {
        self.timers.borrow_mut().push(Timer {
            due: Instant::now(),
            callback,
        });
    }
}

#[derive(Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
