//! simlaunch - launch script simulators in Docker behind an HTTP API.
//!
//! Usage:
//!   simlaunch serve [--host localhost] [--port 5000] [--image <image>]

use clap::{Parser, Subcommand};
use simlaunch::config::{LaunchConfig, IMAGE_ENV};
use simlaunch::http_server;
use simlaunch::runtime::DockerRuntime;
use simlaunch::state::AppState;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "simlaunch")]
#[command(about = "Launch script simulators in containers over HTTP")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Interface to listen on
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "5000")]
    port: u16,

    /// Simulator image to run
    #[arg(long, env = IMAGE_ENV)]
    image: Option<String>,

    /// Container runtime CLI
    #[arg(long, default_value = "docker")]
    runtime: String,

    /// Wall-clock limiter wrapped around the runtime
    #[arg(long, default_value = "timeout")]
    timeout_bin: String,

    /// Hard limit on a simulator's lifetime, in seconds
    #[arg(long, default_value = "1200")]
    max_runtime_secs: u64,

    /// How long to wait for a container to report its id, in seconds
    #[arg(long, default_value = "60")]
    ready_timeout_secs: u64,

    /// Sentinel poll interval in milliseconds
    #[arg(long, default_value = "100")]
    poll_interval_ms: u64,

    /// Where launch directories are created (system temp dir if unset)
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Time a launch stays tracked past its hard limit, in seconds
    #[arg(long, default_value = "300")]
    retention_grace_secs: u64,
}

impl ServeArgs {
    fn launch_config(&self) -> LaunchConfig {
        LaunchConfig {
            image: self.image.clone(),
            runtime: self.runtime.clone(),
            timeout_bin: self.timeout_bin.clone(),
            max_runtime: Duration::from_secs(self.max_runtime_secs),
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            staging_dir: self.staging_dir.clone().unwrap_or_else(std::env::temp_dir),
            retention_grace: Duration::from_secs(self.retention_grace_secs),
        }
    }

    fn addr(&self) -> anyhow::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("{} does not resolve", self.host))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Serve(serve) => {
            let config = serve.launch_config();
            if config.image.is_none() {
                warn!("{} is not set; launches will fail until it is", IMAGE_ENV);
            }
            let runtime = Arc::new(DockerRuntime::connect()?);
            let state = AppState::new(config, runtime);

            let addr = serve.addr()?;
            info!(%addr, "simlaunch ready");
            http_server::run_server(addr, state).await
        }
    }
}
