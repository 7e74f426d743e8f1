//! Connected-account session
//!
//! A [`Session`] resolves the connected account's role once, at connect
//! time, and exposes the operations that role may perform. Anything the
//! role may not do is refused here with [`Error::Unauthorized`] before a
//! command is ever sent to the ledger. The ledger enforces the same rules
//! again on its side.

use crate::{
    read_model::{CachedDonation, ReadModelCache},
    types::{Address, DonationRecord, LedgerEvent, Role, WithdrawalRecord},
    Error, Ledger, Result,
};
use rust_decimal::Decimal;

/// What the connected account sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dashboard {
    /// Registered organization view
    Organization {
        /// Collected, not yet withdrawn
        balance: Decimal,
        /// Past withdrawals, oldest first
        withdrawals: Vec<WithdrawalRecord>,
        /// Donations received, oldest first
        donations_received: Vec<DonationRecord>,
    },
    /// Donor view
    Donor {
        /// Cumulative donations
        total_donated: Decimal,
        /// Reward token balance
        reward_balance: Decimal,
        /// Donation history, oldest first
        donations: Vec<CachedDonation>,
    },
}

/// Session of one connected account
#[derive(Debug)]
pub struct Session<'a> {
    ledger: &'a Ledger,
    account: Address,
    role: Role,
    is_owner: bool,
    cache: ReadModelCache,
}

impl<'a> Session<'a> {
    /// Connect `account`, resolving its role
    ///
    /// The role is fixed for the lifetime of the session; reconnect to pick
    /// up a later registration.
    pub fn connect(ledger: &'a Ledger, account: Address) -> Self {
        let role = ledger.role_of(&account);
        let is_owner = ledger.owner() == account;
        let cache = ReadModelCache::load(&ledger.config().read_model_dir, &account);

        tracing::info!(account = %account, ?role, is_owner, "Session connected");

        Self {
            ledger,
            account,
            role,
            is_owner,
            cache,
        }
    }

    /// Connected account
    pub fn account(&self) -> &Address {
        &self.account
    }

    /// Role resolved at connect time
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the account deployed the ledger
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Cached donor view (may lag the ledger)
    pub fn cached(&self) -> &ReadModelCache {
        &self.cache
    }

    /// Fetch the role-specific dashboard
    pub fn dashboard(&mut self) -> Result<Dashboard> {
        match self.role {
            Role::Organization => Ok(Dashboard::Organization {
                balance: self.ledger.get_balance(&self.account),
                withdrawals: self.ledger.get_withdrawal_history(&self.account),
                donations_received: self.ledger.donations_to_organization(&self.account)?,
            }),
            Role::Donor => {
                self.cache.refresh(self.ledger)?;
                if let Err(e) = self.cache.save(&self.ledger.config().read_model_dir) {
                    tracing::warn!(account = %self.account, error = %e, "Failed to persist read model");
                }
                Ok(Dashboard::Donor {
                    total_donated: self.cache.total_donated,
                    reward_balance: self.cache.reward_balance,
                    donations: self.cache.donations.clone(),
                })
            }
        }
    }

    /// Donate to a registered organization (donors only)
    pub async fn donate(
        &mut self,
        organization: Address,
        amount: Decimal,
    ) -> Result<DonationRecord> {
        self.require(Role::Donor, "donate")?;

        let expected_reward = amount
            .checked_mul(self.ledger.reward_multiplier())
            .unwrap_or(Decimal::ZERO);
        if let Err(e) =
            self.cache
                .record_local_donation(organization.clone(), amount, expected_reward)
        {
            tracing::debug!(error = %e, "Skipping optimistic cache entry");
        }

        let result = self.ledger.donate(&self.account, organization, amount).await;
        self.sync_cache_after_commit();
        result
    }

    /// Withdraw collected funds (organizations only)
    pub async fn withdraw(&self, amount: Decimal) -> Result<WithdrawalRecord> {
        self.require(Role::Organization, "withdraw")?;
        self.ledger.withdraw(&self.account, amount).await
    }

    /// Redeem a perk from the catalogue (donors only)
    pub async fn redeem(&mut self, perk: &str) -> Result<LedgerEvent> {
        self.require(Role::Donor, "redeem rewards")?;
        let result = self.ledger.redeem(&self.account, perk).await;
        self.sync_cache_after_commit();
        result
    }

    /// Register an organization (owner only)
    pub async fn register_organization(&self, organization: Address) -> Result<LedgerEvent> {
        self.require_owner("register organizations")?;
        self.ledger
            .register_organization(&self.account, organization)
            .await
    }

    /// Approve the reserve and move `amount` reward tokens into it (owner only)
    pub async fn fund_contract(&self, amount: Decimal) -> Result<LedgerEvent> {
        self.require_owner("fund the reward reserve")?;
        self.ledger
            .approve(&self.account, self.ledger.reserve_account(), amount)
            .await?;
        self.ledger.fund_contract(&self.account, amount).await
    }

    fn require(&self, role: Role, action: &str) -> Result<()> {
        if self.role != role {
            return Err(Error::Unauthorized(format!(
                "{} ({:?}) cannot {}",
                self.account, self.role, action
            )));
        }
        Ok(())
    }

    fn require_owner(&self, action: &str) -> Result<()> {
        if !self.is_owner {
            return Err(Error::Unauthorized(format!(
                "{} is not the owner and cannot {}",
                self.account, action
            )));
        }
        Ok(())
    }

    fn sync_cache(&mut self) -> Result<()> {
        self.cache.refresh(self.ledger)?;
        self.cache.save(&self.ledger.config().read_model_dir)
    }

    /// The ledger outcome is already decided; a stale cache is only logged
    fn sync_cache_after_commit(&mut self) {
        if let Err(e) = self.sync_cache() {
            tracing::warn!(account = %self.account, error = %e, "Read model not refreshed");
        }
    }
}
