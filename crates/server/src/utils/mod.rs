mod signal;
mod trace;

pub use signal::shutdown_signal;
pub use trace::init_tracing;
