use anyhow::{Context, Result};

mod cli;
mod trace;

use cli::Parser;
use lease_engine::Instance;
use tokio::signal;
use tracing::{debug, info};

fn main() -> Result<()> {
    // parses from cli or environment var
    let config = cli::Config::parse();
    let trace_config = trace::Config::parse(&config.dhcp_log)?;
    if let Err(err) = dotenv::dotenv() {
        debug!(?err, ".env file not loaded");
    }
    debug!(?config, ?trace_config);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("dhcp-lease-worker")
        .enable_all()
        .build()?;

    rt.block_on(start(config))
}

async fn start(config: cli::Config) -> Result<()> {
    let payload = std::fs::read_to_string(&config.config_path)
        .with_context(|| format!("reading config at {}", config.config_path.display()))?;

    let instance = Instance::new(&payload, config.server_ip).await?;

    signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received");
    instance.shutdown().await
}
