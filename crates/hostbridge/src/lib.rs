//! Run snippets on a single privileged thread on behalf of any other thread.
//!
//! [`ExecutionBridge::execute`] is callable from anywhere. When a host has
//! attached the [`DispatchQueue`] to its scheduler, snippets are queued and
//! run one at a time by [`DispatchQueue::drain_one`] on the host's thread;
//! otherwise they run in place.

mod bridge;
mod convert;
pub mod error;
pub mod host;
pub mod queue;
mod result;
pub mod sandbox;

pub use bridge::{DEFAULT_TIMEOUT, ExecutionBridge};
pub use error::{Error, Result};
pub use host::{HostLoop, Scene, Scheduler, StopHandle};
pub use queue::{DispatchQueue, POLL_INTERVAL, Ticket};
pub use result::{ExecutionResult, Failure};
pub use sandbox::{CAPABILITY_NAME, Capability, Executor, RESULT_NAME};
