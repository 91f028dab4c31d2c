//! `affordance-server`: loads a scene, then serves the affordance façade until Ctrl-C.
//!
//! Usage: `affordance-server [config.json]`

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use affordance_bridge::ServerConfig;

fn init_tracing(filter: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .with_context(|| format!("invalid log filter '{filter}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(&path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => ServerConfig::default(),
    };
    init_tracing(&config.log_filter)?;

    let mut server = config.start().context("failed to start affordance server")?;
    info!(ipc_name = %server.ipc_name(), "affordance server ready");

    let shutdown = server.shutdown_handle();

    // The accept loop is blocking; keep it off the async workers. The server is dropped
    // inside the task, which unlinks the socket.
    let mut serve = tokio::task::spawn_blocking(move || server.process_requests(true));

    tokio::select! {
        outcome = &mut serve => {
            return outcome.context("request loop panicked")?.map_err(Into::into);
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("received Ctrl-C, shutting down");
        }
    }

    shutdown.stop();
    // A connected client keeps the loop busy until it hangs up; wait for it.
    serve.await.context("request loop panicked")??;
    info!("affordance server stopped");

    Ok(())
}
