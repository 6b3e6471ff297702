//! fos-portmap: NAT-PMP Port Mapper
//!
//! Maps a TCP+UDP port pair on the gateway, prints every state change as a
//! JSON line and releases the mapping on Ctrl-C.
//!
//! ```text
//! fos-portmap [GATEWAY] [--config PATH]
//! ```
//!
//! The gateway comes from the first argument, then `FOS_NATPMP_GATEWAY`,
//! then the `gateway` key of the config file.

use anyhow::{Context, Result, bail};
use fos_natpmp::{
    LogIssueReporter, NatPmpClient, NatPmpConfig, PortForwardingState, StaticGateway,
    UdpTransport,
};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const GATEWAY_ENV: &str = "FOS_NATPMP_GATEWAY";

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    gateway: Option<String>,
    config: Option<PathBuf>,
}

/// Optional TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    gateway: Option<IpAddr>,
    natpmp: NatPmpConfig,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ if parsed.gateway.is_none() => parsed.gateway = Some(arg),
            _ => bail!("unexpected argument {}", arg),
        }
    }
    Ok(parsed)
}

fn resolve_gateway(args: &Args, env: Option<String>, file: &FileConfig) -> Result<Option<IpAddr>> {
    if let Some(gateway) = args.gateway.as_deref().or(env.as_deref()) {
        let addr = gateway
            .parse()
            .with_context(|| format!("invalid gateway address {}", gateway))?;
        return Ok(Some(addr));
    }
    Ok(file.gateway)
}

fn print_state(state: &PortForwardingState) {
    match serde_json::to_string(state) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to serialize state: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let gateway = resolve_gateway(&args, std::env::var(GATEWAY_ENV).ok(), &file)?;
    if gateway.is_none() {
        warn!("No gateway given (argument, {} or config file)", GATEWAY_ENV);
    }

    let client = NatPmpClient::new(
        file.natpmp,
        Arc::new(UdpTransport::new()),
        Arc::new(StaticGateway(gateway)),
        Arc::new(LogIssueReporter),
    );

    let mut states = client.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match states.recv().await {
                Ok(state) => print_state(&state),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!("fos-portmap starting, press Ctrl-C to release the mapping");
    let runner = client.clone();
    tokio::spawn(async move { runner.start().await });

    tokio::signal::ctrl_c().await?;
    client.stop().await;
    printer.abort();

    info!("fos-portmap shutting down");
    Ok(())
}
