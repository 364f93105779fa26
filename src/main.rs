use std::sync::Arc;
use tracing::{error, info, warn};
use updown_engine::config::Config;
use updown_engine::engine::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("================================================");
    info!("  updown-engine — BTC 15-minute binary trader");
    info!("================================================");

    let config = Config::load_or_default();

    if let Err(e) = config.validate() {
        error!("config validation failed: {e}");
        info!("continuing in dry-run / analysis mode");
    }

    if config.is_dry_run() {
        warn!("DRY RUN MODE — paper fills only, no real orders will be submitted");
    }

    info!("starting capital: ${}", Config::starting_capital());

    let engine = Arc::new(Engine::new(config)?);
    engine.run().await;

    info!("engine stopped");
    Ok(())
}
