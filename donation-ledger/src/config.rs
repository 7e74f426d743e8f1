//! Configuration for the donation ledger

use crate::{
    state::GenesisParams,
    token::{SupplyModel, TokenMetadata},
    types::{Address, MAX_AMOUNT_SCALE},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Contract owner (deployer) address
    pub owner: String,

    /// Organizations the owner registers on first start
    pub bootstrap_organizations: Vec<String>,

    /// Directory for read-model cache files
    pub read_model_dir: PathBuf,

    /// Reward token configuration
    pub token: TokenConfig,

    /// Actor configuration
    pub actor: ActorConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger"),
            service_name: "donation-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            owner: "0x0000000000000000000000000000000000000001".to_string(),
            bootstrap_organizations: Vec::new(),
            read_model_dir: PathBuf::from("./data/read-models"),
            token: TokenConfig::default(),
            actor: ActorConfig::default(),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// Reward token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Token name
    pub name: String,

    /// Ticker
    pub symbol: String,

    /// Display decimals
    pub decimals: u32,

    /// Tokens minted to the owner at genesis
    pub initial_supply: Decimal,

    /// Reward sourcing
    pub supply_model: SupplyModel,

    /// Reward tokens per donated unit
    pub reward_multiplier: Decimal,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "Donation Token".to_string(),
            symbol: "DTK".to_string(),
            decimals: 18,
            initial_supply: Decimal::ZERO,
            supply_model: SupplyModel::Mint,
            reward_multiplier: Decimal::from(1000),
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size (backpressure)
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Sync the WAL on every commit
    pub sync_writes: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_background_jobs: 2,
            sync_writes: true,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `DONATION_LEDGER_*` variables
    pub fn apply_env_overrides(&mut self) -> crate::Result<()> {
        if let Ok(data_dir) = std::env::var("DONATION_LEDGER_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(owner) = std::env::var("DONATION_LEDGER_OWNER") {
            self.owner = owner;
        }

        if let Ok(orgs) = std::env::var("DONATION_LEDGER_ORGANIZATIONS") {
            self.bootstrap_organizations = orgs
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(dir) = std::env::var("DONATION_LEDGER_READ_MODEL_DIR") {
            self.read_model_dir = PathBuf::from(dir);
        }

        if let Ok(multiplier) = std::env::var("DONATION_LEDGER_REWARD_MULTIPLIER") {
            self.token.reward_multiplier = multiplier.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid reward multiplier {}: {}", multiplier, e))
            })?;
        }

        Ok(())
    }

    /// Reject configurations the ledger cannot start with
    pub fn validate(&self) -> crate::Result<()> {
        self.owner_address()?;
        self.bootstrap_addresses()?;

        if self.token.reward_multiplier <= Decimal::ZERO {
            return Err(crate::Error::Config(
                "reward_multiplier must be positive".to_string(),
            ));
        }
        if self.token.initial_supply < Decimal::ZERO {
            return Err(crate::Error::Config(
                "initial_supply must not be negative".to_string(),
            ));
        }
        if self.token.symbol.trim().is_empty() {
            return Err(crate::Error::Config("token symbol must not be empty".to_string()));
        }
        if self.token.decimals > MAX_AMOUNT_SCALE {
            return Err(crate::Error::Config(format!(
                "token decimals must be at most {}",
                MAX_AMOUNT_SCALE
            )));
        }
        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed owner address
    pub fn owner_address(&self) -> crate::Result<Address> {
        Address::parse(&self.owner)
            .map_err(|e| crate::Error::Config(format!("owner: {}", e)))
    }

    /// Parsed bootstrap organizations
    pub fn bootstrap_addresses(&self) -> crate::Result<Vec<Address>> {
        self.bootstrap_organizations
            .iter()
            .map(|raw| {
                Address::parse(raw)
                    .map_err(|e| crate::Error::Config(format!("bootstrap organization: {}", e)))
            })
            .collect()
    }

    /// Reward token display metadata
    pub fn token_metadata(&self) -> TokenMetadata {
        TokenMetadata {
            name: self.token.name.clone(),
            symbol: self.token.symbol.clone(),
            decimals: self.token.decimals,
        }
    }

    /// Genesis parameters for a new log
    pub fn genesis_params(&self) -> crate::Result<GenesisParams> {
        Ok(GenesisParams {
            owner: self.owner_address()?,
            initial_supply: self.token.initial_supply,
            supply_model: self.token.supply_model,
            reward_multiplier: self.token.reward_multiplier,
        })
    }
}
