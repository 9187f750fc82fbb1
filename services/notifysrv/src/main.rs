//! notifysrv entry point
//!
//! Runs the notification consumer loop against Redis, or checks the
//! configuration and store connectivity with the `check` subcommand.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vigil_store::RedisStore;

use notifysrv::{NotifyConfig, Notifier, Result};

#[derive(Parser, Debug)]
#[command(author, version, about = "notifysrv - alert routing service")]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "NOTIFYSRV_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate configuration and store connectivity
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = NotifyConfig::load(args.config.as_deref())?;

    match args.command {
        Some(Commands::Check) => check(config).await,
        None => run(config).await,
    }
}

async fn run(config: NotifyConfig) -> Result<()> {
    info!(redis = %config.redis.url, queue = %config.queue.name, "starting notifysrv");

    let store = RedisStore::new(&config.redis.url).await?;
    let notifier = Notifier::new(Arc::new(store), config)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown requested");
        signal_token.cancel();
    });

    notifier.run(shutdown).await
}

async fn check(config: NotifyConfig) -> Result<()> {
    println!("=== notifysrv configuration check ===\n");

    println!("redis url:      {}", config.redis.url);
    println!("input queue:    {}", config.queue.name);
    println!("wait timeout:   {}s", config.queue.wait_timeout_secs);
    println!("default tz:     {}", config.default_timezone());
    println!("lock ttl:       {}s", config.lock.ttl_secs);
    println!("delivery queues:");
    for (transport, queue) in &config.queues {
        println!("  {} -> {}", transport, queue);
    }

    print!("\nstore connectivity: ");
    match RedisStore::new(&config.redis.url).await {
        Ok(_) => println!("ok"),
        Err(e) => {
            println!("failed: {}", e);
            return Err(e.into());
        }
    }

    println!("\nall checks passed");
    Ok(())
}
