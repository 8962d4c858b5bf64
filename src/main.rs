//! feed-relay daemon: poll loop plus HTTP front door.

use clap::Parser;
use feed_relay::{Config, FeedRelay, api, cancel_on_signal};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "feed-relay", version, about = "Cache and republish a login-protected RSS feed")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FEED_RELAY_CONFIG", default_value = "feed-relay.toml")]
    config: PathBuf,

    /// Upstream username, overrides the configuration file
    #[arg(long, env = "FEED_RELAY_USERNAME")]
    username: Option<String>,

    /// Upstream password, overrides the configuration file
    #[arg(long, env = "FEED_RELAY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Address for the front door, overrides the configuration file
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::from_file(&args.config)?;
    if let Some(username) = args.username {
        config.upstream.username = username;
    }
    if let Some(password) = args.password {
        config.upstream.password = password;
    }
    if let Some(bind) = args.bind {
        config.api.bind_address = bind;
    }
    let api_config = config.api.clone();

    let relay = FeedRelay::new(config)?;
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let (handle, poller) = relay.spawn(shutdown.clone());
    let served = api::start_api_server(handle, &api_config, shutdown.clone()).await;

    // The front door may fail to bind; stop the poll loop either way
    shutdown.cancel();
    poller.await?;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}
