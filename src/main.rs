//! wasm-gateway binary
//!
//! Wires the lifecycle manager, revalidation scheduler, and front
//! server together from CLI arguments and an optional TOML config.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wasm_gateway::gateway::{FetchInterceptionRouter, GatewayServer, InterceptPolicy, OriginAuthority};
use wasm_gateway::module::{HttpModuleFetcher, InstanceLifecycleManager, RevalidationScheduler};
use wasm_gateway::GatewayConfig;

#[derive(Debug, Parser)]
#[command(name = "wasm-gateway", version, about = "HTTP intermediary backed by a hot-swappable WebAssembly module")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Base URL of the fronted origin (overrides config)
    #[arg(short, long)]
    origin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GatewayConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => GatewayConfig::default(),
    };

    let listen_addr = args
        .listen
        .or(config.listen_addr)
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));
    let origin = args
        .origin
        .clone()
        .or_else(|| config.origin.clone())
        .context("no origin configured; pass --origin or set `origin` in the config file")?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.module.fetch_timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    let module_url = format!(
        "{}{}",
        origin.trim_end_matches('/'),
        config.module.source_path
    );
    let fetcher = Arc::new(HttpModuleFetcher::new(client.clone(), module_url));
    let manager = Arc::new(InstanceLifecycleManager::new(fetcher));

    let scheduler = RevalidationScheduler::new(
        Arc::clone(&manager),
        config.revalidation.interval_policy(),
    );
    tokio::spawn(scheduler.run());

    let policy = InterceptPolicy {
        origin: OriginAuthority::parse(&origin),
        assets_prefix: config.intercept.assets_prefix.clone(),
        module_source_path: config.module.source_path.clone(),
        bypass_paths: config.intercept.bypass_paths.clone(),
    };
    let router = Arc::new(FetchInterceptionRouter::new(Arc::clone(&manager), policy));
    let server = GatewayServer::new(listen_addr, origin, router, client);

    tokio::select! {
        result = server.start() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
