mod api;
mod config;
mod db;
mod error;
mod game;
mod leaderboard;
mod lookup;
mod scorer;
mod state;
mod store;
mod types;

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::RequestLatency;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::game::GameService;
use crate::lookup::SystemClock;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Storage ---
    let store = store::open(&cfg).await?;

    // --- Game service ---
    let health = Arc::new(HealthState::new());
    let game = GameService::new(store, Arc::new(SystemClock), Arc::clone(&health));
    info!(
        "Game ready: symbol={} store={} timezone=UTC",
        cfg.symbol, cfg.store_backend,
    );

    // --- HTTP API server ---
    let api_state = ApiState {
        game,
        latency: Arc::new(RequestLatency::new()),
        symbol: cfg.symbol.clone(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
