//! Donation ledger service binary
//!
//! Usage: `donation-ledger [config.toml]`. Without a path the configuration
//! comes from `DONATION_LEDGER_*` environment variables.

use anyhow::Context;
use donation_ledger::{crypto, Config, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let mut config = Config::from_file(&path)
                .with_context(|| format!("loading config from {}", path))?;
            config.apply_env_overrides()?;
            config
        }
        None => Config::from_env().context("loading config from environment")?,
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        data_dir = ?config.data_dir,
        "Starting donation ledger"
    );

    // Open ledger
    let ledger = Ledger::open(config).await.context("opening ledger")?;
    let verified = ledger.verify_log().context("verifying event log")?;
    tracing::info!(
        events = verified,
        owner = %ledger.owner(),
        organizations = ledger.get_organizations().len(),
        custody = %ledger.custody_balance(),
        total_supply = %ledger.total_supply(),
        token = %ledger.token_metadata().symbol,
        head = %crypto::to_hex(&ledger.head_hash()),
        "Ledger opened"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down donation ledger");
    ledger.shutdown().await?;
    Ok(())
}
