//! Per-account read-model cache
//!
//! A client-side projection of one account's donation history and token
//! balance, persisted as JSON so a dashboard can render before the ledger
//! answers. It is advisory only: nothing here is ever submitted back to the
//! ledger, and [`ReadModelCache::reconcile`] overwrites it with the
//! authoritative values whenever they are fetched.

use crate::{
    types::{checked_add, Address, DonationRecord},
    Ledger, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One donation as seen by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDonation {
    /// Committed event id, or a local placeholder id while unconfirmed
    pub id: Uuid,
    /// Log position once confirmed
    pub sequence: Option<u64>,
    /// Recipient
    pub organization: Address,
    /// Donated amount
    pub amount: Decimal,
    /// Reward tokens earned
    pub reward: Decimal,
    /// Commit time, or submission time while unconfirmed
    pub timestamp: DateTime<Utc>,
    /// Seen in the authoritative log
    pub confirmed: bool,
}

impl From<&DonationRecord> for CachedDonation {
    fn from(record: &DonationRecord) -> Self {
        Self {
            id: record.event_id,
            sequence: Some(record.sequence),
            organization: record.organization.clone(),
            amount: record.amount,
            reward: record.reward,
            timestamp: record.timestamp,
            confirmed: true,
        }
    }
}

/// Cached view of a donor account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadModelCache {
    /// Account the cache belongs to
    pub account: Address,
    /// Cumulative donations
    pub total_donated: Decimal,
    /// Reward token balance
    pub reward_balance: Decimal,
    /// Donation history, oldest first
    pub donations: Vec<CachedDonation>,
    /// Last reconciliation
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl ReadModelCache {
    /// Empty cache
    pub fn new(account: Address) -> Self {
        Self {
            account,
            total_donated: Decimal::ZERO,
            reward_balance: Decimal::ZERO,
            donations: Vec::new(),
            reconciled_at: None,
        }
    }

    /// File holding the cache for `account`
    pub fn path_for(dir: &Path, account: &Address) -> PathBuf {
        dir.join(format!("{}.json", account))
    }

    /// Load a cache from `dir`
    ///
    /// A missing, unreadable or corrupt file yields an empty cache.
    pub fn load(dir: &Path, account: &Address) -> Self {
        let path = Self::path_for(dir, account);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self::new(account.clone());
            }
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Read-model cache unreadable, starting empty");
                return Self::new(account.clone());
            }
        };

        match serde_json::from_slice::<Self>(&raw) {
            Ok(cache) if &cache.account == account => cache,
            Ok(cache) => {
                tracing::warn!(
                    path = ?path,
                    found = %cache.account,
                    "Read-model cache belongs to another account, starting empty"
                );
                Self::new(account.clone())
            }
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Read-model cache corrupt, starting empty");
                Self::new(account.clone())
            }
        }
    }

    /// Persist to `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path_for(dir, &self.account);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Record a just-submitted donation before the ledger confirms it
    ///
    /// Returns the placeholder id of the unconfirmed entry.
    pub fn record_local_donation(
        &mut self,
        organization: Address,
        amount: Decimal,
        reward: Decimal,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.total_donated = checked_add(self.total_donated, amount)?;
        self.reward_balance = checked_add(self.reward_balance, reward)?;
        self.donations.push(CachedDonation {
            id,
            sequence: None,
            organization,
            amount,
            reward,
            timestamp: Utc::now(),
            confirmed: false,
        });
        Ok(id)
    }

    /// Replace the cache contents with authoritative values
    ///
    /// Donations are merged by event id, so fetching overlapping history
    /// twice never duplicates an entry. Unconfirmed local entries are
    /// dropped; if they were committed they arrive here under their event id.
    pub fn reconcile(
        &mut self,
        donations: &[DonationRecord],
        total_donated: Decimal,
        reward_balance: Decimal,
    ) {
        self.donations.retain(|d| d.confirmed);
        for record in donations {
            if record.donor != self.account {
                continue;
            }
            match self.donations.iter_mut().find(|d| d.id == record.event_id) {
                Some(existing) => *existing = record.into(),
                None => self.donations.push(record.into()),
            }
        }
        self.donations.sort_by_key(|d| d.sequence);

        self.total_donated = total_donated;
        self.reward_balance = reward_balance;
        self.reconciled_at = Some(Utc::now());
    }

    /// Fetch the authoritative view from `ledger` and reconcile
    pub fn refresh(&mut self, ledger: &Ledger) -> Result<()> {
        let donations = ledger.donations_by_donor(&self.account)?;
        let total_donated = ledger.get_total_donations(&self.account);
        let reward_balance = ledger.balance_of(&self.account);
        self.reconcile(&donations, total_donated, reward_balance);

        tracing::debug!(
            account = %self.account,
            donations = self.donations.len(),
            "Read model reconciled"
        );
        Ok(())
    }

    /// Drop cached history and totals
    pub fn invalidate(&mut self) {
        self.donations.clear();
        self.total_donated = Decimal::ZERO;
        self.reward_balance = Decimal::ZERO;
        self.reconciled_at = None;
    }

    /// Entries not yet seen in the log
    pub fn pending(&self) -> impl Iterator<Item = &CachedDonation> {
        self.donations.iter().filter(|d| !d.confirmed)
    }
}
