//! Rack provider - Kubernetes provider bootstrap for the rack control plane

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use rack_provider::bootstrap;
use rack_provider::heartbeat::HEARTBEAT_INTERVAL;
use rack_provider::provider::{Provider, ProviderOptions};
use rack_provider::telemetry::{self, LogFormat};

/// Rack provider - credentials, controllers and heartbeat for a rack
#[derive(Parser, Debug)]
#[command(name = "rack-provider", version, about, long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the provider (default mode)
    ///
    /// Builds the provider from the environment, starts the controllers
    /// and the heartbeat, then runs until interrupted.
    Run {
        /// Seconds between heartbeats
        #[arg(
            long,
            default_value_t = HEARTBEAT_INTERVAL.as_secs(),
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        heartbeat_interval: u64,
    },

    /// Resolve credentials and rack identity, print them and exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::install();

    let cli = Cli::parse();
    telemetry::init_logging(cli.log_format)?;

    match cli.command {
        Some(Commands::Check) => run_check().await,
        Some(Commands::Run { heartbeat_interval }) => {
            run_provider(Duration::from_secs(heartbeat_interval)).await
        }
        None => run_provider(HEARTBEAT_INTERVAL).await,
    }
}

/// Build the provider, start everything and wait for ctrl-c
async fn run_provider(heartbeat_interval: Duration) -> anyhow::Result<()> {
    let provider = Arc::new(Provider::from_env().await?);
    provider.initialize(ProviderOptions { heartbeat_interval })?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Print what the provider resolved, without starting anything
async fn run_check() -> anyhow::Result<()> {
    let provider = Provider::from_env().await?;
    let identity = provider.identity();

    let report = serde_json::json!({
        "server": provider.config().cluster_url.to_string(),
        "rack": identity.name,
        "namespace": identity.namespace,
        "domain": identity.domain,
        "image": identity.image,
        "provider": identity.provider,
        "socket": identity.socket,
        "storage": identity.storage,
        "version": identity.version,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
