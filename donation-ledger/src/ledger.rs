//! Main ledger orchestration layer
//!
//! This module ties together storage, the state machine and the writer
//! actor into the public donation API.
//!
//! # Example
//!
//! ```no_run
//! use donation_ledger::{Address, Config, Ledger};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> donation_ledger::Result<()> {
//!     let config = Config::default();
//!     let owner = config.owner_address()?;
//!     let ledger = Ledger::open(config).await?;
//!
//!     let org = Address::parse("0x5CfE6ef4E8cff3b918224dAC699B20e383370B41")?;
//!     ledger.register_organization(&owner, org.clone()).await?;
//!
//!     let donor = Address::parse("0x8929E3230FebF6545E147957981045b13A2c5b54")?;
//!     ledger.donate(&donor, org, Decimal::new(25, 1)).await?;
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    crypto,
    metrics::Metrics,
    state::{Command, LedgerState},
    token::{RewardCatalog, TokenMetadata},
    types::{now_nanos, Address, DonationRecord, LedgerEvent, Role, WithdrawalRecord},
    Config, Error, Result, Storage,
};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Latest applied state (for reads)
    state: Arc<RwLock<LedgerState>>,

    /// Direct storage access (for event queries)
    storage: Arc<Storage>,

    /// Metrics
    metrics: Metrics,

    /// Perks purchasable with reward tokens
    catalog: RewardCatalog,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// A new data directory gets a genesis event built from the config; an
    /// existing one is replayed and its hash chain verified.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(Storage::open(&config)?);

        let mut events = storage.all_events()?;
        if events.is_empty() {
            let genesis = LedgerState::genesis_event(config.genesis_params()?, now_nanos())?;
            storage.append_event(&genesis)?;
            tracing::info!(
                owner = %config.owner,
                hash = %crypto::to_hex(&genesis.hash),
                "Created genesis event"
            );
            events.push(genesis);
        }

        let state = LedgerState::replay(&events)?;
        tracing::info!(
            events = events.len(),
            organizations = state.get_organizations().len(),
            "Replayed event log"
        );

        if state.owner() != &config.owner_address()? {
            tracing::warn!(
                configured = %config.owner,
                recorded = %state.owner(),
                "Configured owner differs from genesis; genesis wins"
            );
        }

        let metrics = Metrics::new()
            .map_err(|e| Error::Other(format!("Failed to create metrics: {}", e)))?;
        let state = Arc::new(RwLock::new(state));
        let handle = spawn_ledger_actor(
            state.clone(),
            storage.clone(),
            metrics.clone(),
            config.actor.mailbox_capacity,
        );

        let ledger = Self {
            handle,
            state,
            storage,
            metrics,
            catalog: RewardCatalog::default(),
            config,
        };
        ledger.bootstrap_organizations().await?;

        Ok(ledger)
    }

    /// Register configured organizations that are not registered yet
    async fn bootstrap_organizations(&self) -> Result<()> {
        let owner = self.owner();
        for organization in self.config.bootstrap_addresses()? {
            if self.is_organization(&organization) {
                continue;
            }
            self.register_organization(&owner, organization).await?;
        }
        Ok(())
    }

    // Donation ledger operations

    /// Owner adds an organization to the registry
    pub async fn register_organization(
        &self,
        caller: &Address,
        organization: Address,
    ) -> Result<LedgerEvent> {
        self.handle
            .execute(
                caller.clone(),
                Command::RegisterOrganization { organization },
            )
            .await
    }

    /// Donate `amount` to a registered organization
    ///
    /// The donor receives `amount × reward multiplier` reward tokens in the same commit.
    pub async fn donate(
        &self,
        caller: &Address,
        organization: Address,
        amount: Decimal,
    ) -> Result<DonationRecord> {
        let event = self
            .handle
            .execute(
                caller.clone(),
                Command::Donate {
                    organization,
                    amount,
                },
            )
            .await?;

        event.as_donation().ok_or_else(|| {
            Error::InvariantViolation(format!("donate committed {}", event.kind.name()))
        })
    }

    /// Registered organization withdraws collected funds
    pub async fn withdraw(&self, caller: &Address, amount: Decimal) -> Result<WithdrawalRecord> {
        let event = self
            .handle
            .execute(caller.clone(), Command::Withdraw { amount })
            .await?;

        event.as_withdrawal().ok_or_else(|| {
            Error::InvariantViolation(format!("withdraw committed {}", event.kind.name()))
        })
    }

    // Reward token operations

    /// Send reward tokens
    pub async fn transfer(
        &self,
        caller: &Address,
        to: Address,
        amount: Decimal,
    ) -> Result<LedgerEvent> {
        self.handle
            .execute(caller.clone(), Command::Transfer { to, amount })
            .await
    }

    /// Set an allowance
    pub async fn approve(
        &self,
        caller: &Address,
        spender: Address,
        amount: Decimal,
    ) -> Result<LedgerEvent> {
        self.handle
            .execute(caller.clone(), Command::Approve { spender, amount })
            .await
    }

    /// Owner moves approved tokens into the reward reserve
    pub async fn fund_contract(&self, caller: &Address, amount: Decimal) -> Result<LedgerEvent> {
        self.handle
            .execute(caller.clone(), Command::FundContract { amount })
            .await
    }

    /// Redeem a perk by paying its cost into the reserve
    pub async fn redeem(&self, caller: &Address, perk: &str) -> Result<LedgerEvent> {
        let cost = self.catalog.cost_of(perk)?;
        let sink = self.reserve_account();
        let event = self.transfer(caller, sink, cost).await?;
        tracing::info!(account = %caller, perk, %cost, "Reward redeemed");
        Ok(event)
    }

    // Reads

    /// Contract owner
    pub fn owner(&self) -> Address {
        self.state.read().owner().clone()
    }

    /// Reward tokens per donated unit
    pub fn reward_multiplier(&self) -> Decimal {
        self.state.read().reward_multiplier()
    }

    /// Collected balance of an organization (zero if unknown)
    pub fn get_balance(&self, organization: &Address) -> Decimal {
        self.state.read().get_balance(organization)
    }

    /// Cumulative donations of a donor (zero if none)
    pub fn get_total_donations(&self, donor: &Address) -> Decimal {
        self.state.read().get_total_donations(donor)
    }

    /// Registered organizations in registration order
    pub fn get_organizations(&self) -> Vec<Address> {
        self.state.read().get_organizations().to_vec()
    }

    /// Registration check
    pub fn is_organization(&self, account: &Address) -> bool {
        self.state.read().is_organization(account)
    }

    /// Role of an account
    pub fn role_of(&self, account: &Address) -> Role {
        self.state.read().role_of(account)
    }

    /// Withdrawals of an organization, oldest first (public)
    pub fn get_withdrawal_history(&self, organization: &Address) -> Vec<WithdrawalRecord> {
        self.state.read().get_withdrawal_history(organization)
    }

    /// Funds released to an organization so far
    pub fn paid_out(&self, organization: &Address) -> Decimal {
        self.state.read().paid_out(organization)
    }

    /// Native funds held in custody
    pub fn custody_balance(&self) -> Decimal {
        self.state.read().custody_balance()
    }

    /// Reward token balance
    pub fn balance_of(&self, account: &Address) -> Decimal {
        self.state.read().token().balance_of(account)
    }

    /// Reward token allowance
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Decimal {
        self.state.read().token().allowance(owner, spender)
    }

    /// Reward tokens in circulation
    pub fn total_supply(&self) -> Decimal {
        self.state.read().token().total_supply()
    }

    /// Reward reserve / redemption sink account
    pub fn reserve_account(&self) -> Address {
        self.state.read().token().reserve().clone()
    }

    /// Tokens left in the reward reserve
    pub fn reserve_balance(&self) -> Decimal {
        self.state.read().token().reserve_balance()
    }

    /// Reward token name, symbol and display decimals
    pub fn token_metadata(&self) -> TokenMetadata {
        self.config.token_metadata()
    }

    /// Redemption catalogue
    pub fn reward_catalog(&self) -> &RewardCatalog {
        &self.catalog
    }

    // Event log queries

    /// Events with `from <= sequence < to`
    pub fn events(&self, from: u64, to: u64) -> Result<Vec<LedgerEvent>> {
        self.storage.events_range(from, to)
    }

    /// Donations made by `donor`, oldest first
    pub fn donations_by_donor(&self, donor: &Address) -> Result<Vec<DonationRecord>> {
        Ok(self
            .storage
            .account_events(donor)?
            .iter()
            .filter_map(LedgerEvent::as_donation)
            .filter(|d| &d.donor == donor)
            .collect())
    }

    /// Donations received by `organization`, oldest first
    pub fn donations_to_organization(
        &self,
        organization: &Address,
    ) -> Result<Vec<DonationRecord>> {
        Ok(self
            .storage
            .account_events(organization)?
            .iter()
            .filter_map(LedgerEvent::as_donation)
            .filter(|d| &d.organization == organization)
            .collect())
    }

    /// Re-verify the hash chain and check that replaying it reproduces the live state
    ///
    /// Returns the number of verified events.
    pub fn verify_log(&self) -> Result<usize> {
        let live = self.state.read();
        let events = self.storage.events_range(0, live.last_sequence() + 1)?;
        crypto::verify_chain(&events)?;

        let replayed = LedgerState::replay(&events)?;
        if replayed != *live {
            return Err(Error::InvariantViolation(
                "replayed log diverges from live state".to_string(),
            ));
        }
        replayed.check_invariants()?;

        Ok(events.len())
    }

    /// Hash of the newest committed event
    pub fn head_hash(&self) -> [u8; 32] {
        self.state.read().last_hash()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}
