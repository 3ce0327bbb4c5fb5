use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context as _;
use hostbridge::{DispatchQueue, ExecutionBridge, Executor, Scheduler};
use tokio::runtime::Runtime;

use crate::{config::Config, protocol::Dispatcher, transport::Server};

/// How long blocking handlers still parked on the bridge may delay exit.
const RUNTIME_GRACE: Duration = Duration::from_secs(1);

/// Everything one embedded server instance owns: the dispatch queue with its
/// registration flag, the listener lifecycle and the runtime driving it.
///
/// `start` and `stop` block, so they must not be called from inside an
/// async context.
pub struct ServerContext {
    queue: Arc<DispatchQueue>,
    server: Server,
    runtime: Runtime,
}

impl ServerContext {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("hostbridge-io")
            .build()
            .context("failed to build tokio runtime")?;

        let queue = Arc::new(DispatchQueue::new());
        let bridge = ExecutionBridge::new(queue.clone(), config.execution_timeout);
        let dispatcher = Dispatcher::new(config.protocol, bridge);
        let server = Server::new(config.transport, config.bind_addr()?, dispatcher);

        Ok(Self {
            queue,
            server,
            runtime,
        })
    }

    /// Hooks the queue's drain callback into `scheduler`. Must be called on
    /// the privileged context; returns `false` if already attached.
    pub fn attach<S: Scheduler + ?Sized>(&self, scheduler: &S, executor: Executor) -> bool {
        self.queue.ensure_registered(scheduler, executor)
    }

    pub fn start(&self) -> anyhow::Result<SocketAddr> {
        self.runtime.block_on(self.server.start())
    }

    pub fn stop(&self) {
        self.runtime.block_on(self.server.stop());
    }

    /// Stops the server and tears down the runtime without waiting out
    /// requests still parked on the bridge.
    pub fn shutdown(self) {
        self.stop();
        self.runtime.shutdown_timeout(RUNTIME_GRACE);
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    #[must_use]
    pub const fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }
}
