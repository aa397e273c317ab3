//! Liquidation keeper daemon, reference wiring
//!
//! Runs the keeper against `EngineConfig::build_reference_engine`: in-memory
//! token ledgers and a static in-memory price feed seeded from the configured
//! markets. No user operations reach this process, so every sweep finds no
//! debtors. It shows how configuration, logging, the shared engine and the
//! keeper fit together; a deployment embeds the library and supplies real
//! token and oracle bindings plus its own source of user operations.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use collateral_engine::{tracing_logger, AccountId, EngineConfig, LiquidationKeeper, SystemClock};

fn load_config() -> Result<EngineConfig> {
    let config = match std::env::var("ENGINE_CONFIG") {
        Ok(path) => EngineConfig::from_toml_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => EngineConfig::from_env().context("reading ENGINE_* environment")?,
    };
    config.validate().context("validating engine configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = load_config()?;
    tracing_logger::init_subscriber(&config.log_level);

    let engine = config
        .build_reference_engine(Arc::new(SystemClock))
        .context("building reference engine")?
        .into_shared();
    warn!("Running reference wiring: in-memory ledgers and price feed, no user operations");

    if !config.keeper.enabled {
        warn!("Liquidation keeper disabled; nothing to run");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let keeper = LiquidationKeeper::new(engine, AccountId::new(config.admin.clone()))
        .with_interval(config.keeper.interval());
    let handle = tokio::spawn(keeper.run(shutdown_rx));

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutdown requested");

    shutdown_tx.send(true).ok();
    handle.await.context("joining liquidation keeper")?;
    Ok(())
}
