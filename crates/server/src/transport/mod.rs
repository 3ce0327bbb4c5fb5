//! Network front-ends. Each one maps its unit of exchange (an HTTP body, a
//! line, a WebSocket message) onto [`Dispatcher::dispatch`].

mod http;
mod tcp;
mod ws;

use std::{fmt, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use parking_lot::Mutex;
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};

pub use self::http::MAX_BODY_BYTES;
use crate::{config::ConfigError, protocol::Dispatcher};

const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Http,
    Tcp,
    WebSocket,
}

impl Transport {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Tcp => "TCP",
            Self::WebSocket => "WebSocket",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Tcp => "tcp",
            Self::WebSocket => "ws",
        })
    }
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "tcp" => Ok(Self::Tcp),
            "ws" | "websocket" => Ok(Self::WebSocket),
            _ => Err(ConfigError::unrecognized("transport", s, "http, tcp, ws")),
        }
    }
}

/// Resolves once [`Server::stop`] has been called.
#[derive(Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub async fn wait(mut self) {
        // a dropped sender also means stop
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}

struct Running {
    local_addr: SocketAddr,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Server {
    transport: Transport,
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    running: Mutex<Option<Running>>,
}

impl Server {
    #[must_use]
    pub fn new(transport: Transport, addr: SocketAddr, dispatcher: Dispatcher) -> Self {
        Self {
            transport,
            addr,
            dispatcher: Arc::new(dispatcher),
            running: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn transport(&self) -> Transport {
        self.transport
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|running| running.local_addr)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Binds and starts serving in the background, returning the bound
    /// address. Calling it again while running returns the same address.
    pub async fn start(&self) -> anyhow::Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            tracing::info!(%addr, "server already running");
            return Ok(addr);
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {} listener on {}", self.transport, self.addr))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read bound address")?;

        let mut running = self.running.lock();
        if let Some(existing) = running.as_ref() {
            return Ok(existing.local_addr);
        }

        let (stop, signal) = watch::channel(false);
        let shutdown = Shutdown(signal);
        let dispatcher = self.dispatcher.clone();
        let task = match self.transport {
            Transport::Http => tokio::spawn(http::serve(listener, dispatcher, shutdown)),
            Transport::Tcp => tokio::spawn(tcp::serve(listener, dispatcher, shutdown)),
            Transport::WebSocket => tokio::spawn(ws::serve(listener, dispatcher, shutdown)),
        };
        *running = Some(Running {
            local_addr,
            stop,
            task,
        });

        tracing::info!(
            %local_addr,
            transport = %self.transport,
            protocol = %self.dispatcher.protocol(),
            "server listening"
        );
        Ok(local_addr)
    }

    /// Signals the accept loop and every open connection, then waits for the
    /// serve task. The listener is closed when this returns.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(Running {
            local_addr,
            stop,
            mut task,
        }) = running
        else {
            tracing::debug!("stop requested but server is not running");
            return;
        };

        let _ = stop.send(true);
        match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(?err, "server task ended abnormally"),
            Err(_) => {
                tracing::warn!(
                    grace_secs = STOP_GRACE.as_secs(),
                    "server did not stop in time, aborting"
                );
                task.abort();
                let _ = task.await;
            }
        }
        tracing::info!(%local_addr, "server stopped");
    }
}
