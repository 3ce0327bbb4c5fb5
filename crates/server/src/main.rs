use std::env::args;

use anyhow::anyhow;
use hostbridge::{Executor, HostLoop, Scene};
use hostbridge_server::{
    Config, ServerContext,
    utils::{init_tracing, shutdown_signal},
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let task = args().nth(1);
    match task.as_deref() {
        None | Some("serve") => serve_embedded(&Config::from_env()),
        Some("standalone") => serve_standalone(&Config::from_env()),
        Some(other) => Err(anyhow!("unknown task: {other}")),
    }
}

/// The main thread plays the host: it owns the scene and drains snippets
/// while the runtime's worker threads serve the network.
fn serve_embedded(config: &Config) -> anyhow::Result<()> {
    let ctx = ServerContext::new(config)?;
    let host = HostLoop::new();
    ctx.attach(&host, Executor::with_capability(Scene::new()));
    ctx.start()?;

    let stop = host.stop_handle();
    ctx.runtime().spawn(async move {
        shutdown_signal().await;
        stop.stop();
    });

    host.run();
    ctx.shutdown();
    Ok(())
}

/// No privileged context: snippets run on whichever blocking thread
/// received them, with no `host` bound.
fn serve_standalone(config: &Config) -> anyhow::Result<()> {
    let ctx = ServerContext::new(config)?;
    ctx.start()?;
    ctx.runtime().block_on(shutdown_signal());
    ctx.shutdown();
    Ok(())
}
