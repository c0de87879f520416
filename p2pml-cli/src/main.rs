use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use p2pml_engine::{Loader, LoaderConfig, StaticPlaybackProvider};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const DEFAULT_LOG_FILTER: &str = "p2pml=info,p2pml_engine=info,tower_http=warn";

/// Serve HLS streams through a local proxy that hands segment fetches to a
/// peer-delivery engine.
#[derive(Debug, Parser)]
#[command(name = "p2pml", version, about)]
struct Args {
    /// Manifest URLs to print proxied playback URLs for
    urls: Vec<String>,

    /// Address to bind the proxy to
    #[arg(long)]
    bind: Option<String>,

    /// Port to bind the proxy to, 0 picks a free one
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON file with the core configuration sent to the delivery engine
    #[arg(long, value_name = "FILE")]
    core_config: Option<PathBuf>,

    /// Start with peer delivery disabled
    #[arg(long)]
    engine_disabled: bool,

    /// Seconds a segment waits for the delivery engine before using the origin
    #[arg(long, value_name = "SECS")]
    bridge_timeout: Option<u64>,

    /// Log filter directives, overrides RUST_LOG
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let config = build_config(&args).await?;
    let mut loader = Loader::new(config);
    loader
        .start(Arc::new(StaticPlaybackProvider::default()))
        .await
        .context("failed to start proxy")?;

    let addr = loader.local_addr()?;
    info!("Delivery engine endpoint: ws://{addr}/engine");
    for url in &args.urls {
        println!("{}", loader.manifest_url(url)?);
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutting down");
    loader.stop().await?;
    Ok(())
}

async fn build_config(args: &Args) -> anyhow::Result<LoaderConfig> {
    let mut config = LoaderConfig::from_env_or_default();

    if let Some(bind) = &args.bind {
        config.bind_address = bind.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = &args.core_config {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read core config {}", path.display()))?;
        config.core_config_json = Some(json);
    }
    if args.engine_disabled {
        config.engine_enabled = false;
    }
    if let Some(secs) = args.bridge_timeout.filter(|s| *s > 0) {
        config.bridge_timeout = Duration::from_secs(secs);
    }

    Ok(config)
}

fn init_logging(directives: Option<&str>) {
    let filter = match directives {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
