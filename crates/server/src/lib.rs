//! Network front-ends for [`hostbridge`]: JSON-RPC/MCP dispatch over HTTP,
//! newline-delimited TCP and WebSocket, plus the [`ServerContext`] that ties
//! a listener to a host's privileged context.

pub mod config;
pub mod context;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use config::{Config, ConfigError};
pub use context::ServerContext;
pub use protocol::{Dispatcher, Fault, Protocol};
pub use transport::{Server, Transport};
