use std::fs::File;
use std::io::Read as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use log::{info, warn};

mod config;
mod messages;
mod registry;
mod server;
mod stations;
mod store;

#[derive(Parser, Debug)]
#[command(about = "Tank level aggregator: device registry and HTTP API")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let mut file = File::open(&args.config)
        .with_context(|| format!("failed to open {}", args.config.display()))?;
    let mut config_contents = String::new();
    file.read_to_string(&mut config_contents)?;

    let config: config::AppConfig = toml::de::from_str(&config_contents)?;

    let mut registry = registry::Registry::new();
    let store_config = config.store.clone().unwrap_or_default();
    let store = store::DeviceStore::new(PathBuf::from(store_config.path()));
    match store.load(&mut registry) {
        Ok(stats) => {
            println!("Loaded {} devices from {}", stats.loaded, store_config.path());
            if stats.dropped > 0 {
                warn!(
                    "device store held more records than the table holds; dropped {}",
                    stats.dropped
                );
            }
        }
        Err(store::StoreError::NotFound) => println!("No device store yet; starting fresh"),
        Err(err) => warn!("could not load device store ({err}); starting empty"),
    }

    let stations_config = config.stations.clone().unwrap_or_default();
    let poller = stations::StationPoller::new(stations_config.command.clone());
    let state = Arc::new(server::AppState::new(registry, store, poller));

    // periodic passive-discovery tick, independent of API traffic
    if state.stations.enabled() {
        let state_for_worker = state.clone();
        let period = Duration::from_secs(stations_config.poll_interval_seconds().max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                server::refresh_stations(&state_for_worker).await;
            }
        });
        info!(
            "station polling every {}s: {:?}",
            stations_config.poll_interval_seconds(),
            stations_config.command
        );
    }

    let bind = config.http.unwrap_or_default().bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    println!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        server::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
