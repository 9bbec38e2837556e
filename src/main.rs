//! Gateway server entry point.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use opsgate::api::{ApiConfig, ApiServer};
use opsgate::config::EngineConfig;

#[derive(Debug, Parser)]
#[command(name = "opsgate", version, about = "Remote command execution gateway")]
struct Cli {
    /// Address to bind the gateway to
    #[arg(long, default_value = "127.0.0.1:8080", env = "OPSGATE_BIND")]
    bind: SocketAddr,

    /// Maximum concurrent host connections per run
    #[arg(long)]
    forks: Option<usize>,

    /// Default remote user when a request supplies none
    #[arg(long, default_value = "root")]
    remote_user: String,

    /// Default private key file for SSH authentication
    #[arg(long)]
    private_key: Option<String>,

    /// Report what would run without executing anything
    #[arg(long)]
    check: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity);

    let mut engine_config = EngineConfig::default()
        .with_remote_user(&cli.remote_user)
        .with_check(cli.check);
    if let Some(forks) = cli.forks {
        engine_config = engine_config.with_forks(forks);
    }
    if let Some(key) = cli.private_key {
        engine_config = engine_config.with_private_key_file(key);
    }

    let api_config = ApiConfig::default().with_address(cli.bind);
    let server = ApiServer::new(api_config, engine_config);
    server.run().await?;

    Ok(())
}

/// Initialize logging based on verbosity level.
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}
