//! Reward token ledger
//!
//! Fungible balance sheet for the reward token, kept apart from the
//! donation bookkeeping so reward economics can change independently.
//!
//! Every mutating method validates first and mutates last, so a rejected
//! call leaves the balance sheet untouched.
//!
//! # Invariants
//!
//! - Σ(balances) == total_supply
//! - No balance or allowance is ever negative

use crate::{
    types::{checked_add, ensure_valid_amount, Address},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Account holding the ledger's own reward reserve; also the redemption sink
pub const RESERVE_ACCOUNT: &str = "0x00000000000000000000000000000000d0a71e00";

/// Where donation rewards come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyModel {
    /// Rewards are freshly minted; supply grows without bound
    Mint,
    /// Rewards are paid out of a pre-funded reserve
    Fixed,
}

/// Reward token balance sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardToken {
    owner: Address,
    reserve: Address,
    model: SupplyModel,
    balances: HashMap<Address, Decimal>,
    allowances: HashMap<(Address, Address), Decimal>,
    total_supply: Decimal,
}

impl RewardToken {
    /// Deploy the token, minting `initial_supply` to the owner
    pub fn new(owner: Address, model: SupplyModel, initial_supply: Decimal) -> Result<Self> {
        if initial_supply < Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "initial supply must not be negative, got {}",
                initial_supply
            )));
        }

        let mut balances = HashMap::new();
        if !initial_supply.is_zero() {
            balances.insert(owner.clone(), initial_supply);
        }

        Ok(Self {
            owner,
            reserve: Address::new(RESERVE_ACCOUNT),
            model,
            balances,
            allowances: HashMap::new(),
            total_supply: initial_supply,
        })
    }

    /// Supply model
    pub fn model(&self) -> SupplyModel {
        self.model
    }

    /// Reserve account address
    pub fn reserve(&self) -> &Address {
        &self.reserve
    }

    /// Total tokens in circulation
    pub fn total_supply(&self) -> Decimal {
        self.total_supply
    }

    /// Balance of an account (zero if unknown)
    pub fn balance_of(&self, account: &Address) -> Decimal {
        self.balances.get(account).copied().unwrap_or(Decimal::ZERO)
    }

    /// Tokens left to pay rewards from under the fixed model
    pub fn reserve_balance(&self) -> Decimal {
        self.balance_of(&self.reserve)
    }

    /// Remaining allowance `owner` granted to `spender`
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Decimal {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Check that a reward of `amount` can be issued
    pub fn check_issue(&self, amount: Decimal) -> Result<()> {
        ensure_valid_amount(amount)?;
        match self.model {
            SupplyModel::Mint => {
                checked_add(self.total_supply, amount)?;
            }
            SupplyModel::Fixed => {
                let reserve = self.reserve_balance();
                if reserve < amount {
                    return Err(Error::SupplyExhausted {
                        needed: amount,
                        reserve,
                    });
                }
            }
        }
        Ok(())
    }

    /// Credit a donation reward to `to`, minting or drawing on the reserve
    pub fn mint_or_transfer(&mut self, to: &Address, amount: Decimal) -> Result<()> {
        self.check_issue(amount)?;
        match self.model {
            SupplyModel::Mint => {
                self.total_supply += amount;
                self.credit(to, amount);
            }
            SupplyModel::Fixed => {
                let reserve = self.reserve.clone();
                self.debit(&reserve, amount);
                self.credit(to, amount);
            }
        }
        Ok(())
    }

    /// Check a holder-initiated transfer
    pub fn check_transfer(&self, from: &Address, amount: Decimal) -> Result<()> {
        ensure_valid_amount(amount)?;
        let available = self.balance_of(from);
        if available < amount {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    /// Move tokens from `from` to `to`
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Decimal) -> Result<()> {
        self.check_transfer(from, amount)?;
        self.debit(from, amount);
        self.credit(to, amount);
        Ok(())
    }

    /// Set the allowance `owner` grants `spender`; zero revokes
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Decimal) -> Result<()> {
        if amount < Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "allowance must not be negative, got {}",
                amount
            )));
        }
        let key = (owner.clone(), spender.clone());
        if amount.is_zero() {
            self.allowances.remove(&key);
        } else {
            self.allowances.insert(key, amount);
        }
        Ok(())
    }

    /// Check that `spender` may move `amount` out of `from`
    pub fn check_transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        amount: Decimal,
    ) -> Result<()> {
        self.check_transfer(from, amount)?;
        let approved = self.allowance(from, spender);
        if approved < amount {
            return Err(Error::InsufficientAllowance {
                requested: amount,
                approved,
            });
        }
        Ok(())
    }

    /// Move tokens on behalf of `from`, consuming `spender`'s allowance
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Decimal,
    ) -> Result<()> {
        self.check_transfer_from(spender, from, amount)?;
        let remaining = self.allowance(from, spender) - amount;
        self.approve(from, spender, remaining)?;
        self.debit(from, amount);
        self.credit(to, amount);
        Ok(())
    }

    /// Check an owner top-up of the reward reserve
    pub fn check_fund_reserve(&self, caller: &Address, amount: Decimal) -> Result<()> {
        if caller != &self.owner {
            return Err(Error::Unauthorized(format!(
                "{} is not the owner and cannot fund the reserve",
                caller
            )));
        }
        self.check_transfer_from(&self.reserve, caller, amount)
    }

    /// Owner moves approved tokens into the reward reserve
    pub fn fund_reserve(&mut self, caller: &Address, amount: Decimal) -> Result<()> {
        self.check_fund_reserve(caller, amount)?;
        let reserve = self.reserve.clone();
        self.transfer_from(&reserve, caller, &reserve, amount)
    }

    /// Sum of all balances; equals `total_supply` when the sheet is consistent
    pub fn circulating(&self) -> Decimal {
        self.balances.values().copied().sum()
    }

    fn credit(&mut self, account: &Address, amount: Decimal) {
        *self.balances.entry(account.clone()).or_insert(Decimal::ZERO) += amount;
    }

    fn debit(&mut self, account: &Address, amount: Decimal) {
        if let Some(balance) = self.balances.get_mut(account) {
            *balance -= amount;
            if balance.is_zero() {
                self.balances.remove(account);
            }
        }
    }
}

/// Display metadata of the reward token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Token name
    pub name: String,
    /// Ticker
    pub symbol: String,
    /// Fractional digits wallets display
    pub decimals: u32,
}

/// Perk that can be bought with reward tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perk {
    /// Display name
    pub name: String,
    /// Cost in reward tokens
    pub cost: Decimal,
}

/// Redemption catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCatalog {
    perks: Vec<Perk>,
}

impl RewardCatalog {
    /// Build a catalogue from perks
    pub fn new(perks: Vec<Perk>) -> Self {
        Self { perks }
    }

    /// Look up a perk by name
    pub fn perk(&self, name: &str) -> Option<&Perk> {
        self.perks.iter().find(|p| p.name == name)
    }

    /// All perks
    pub fn perks(&self) -> &[Perk] {
        &self.perks
    }

    /// Cost of a perk, or a rejection if it is not offered
    pub fn cost_of(&self, name: &str) -> Result<Decimal> {
        self.perk(name)
            .map(|p| p.cost)
            .ok_or_else(|| Error::Other(format!("Unknown reward: {}", name)))
    }
}

impl Default for RewardCatalog {
    fn default() -> Self {
        Self::new(vec![
            Perk {
                name: "T-Shirt".to_string(),
                cost: Decimal::from(50),
            },
            Perk {
                name: "Sticker Pack".to_string(),
                cost: Decimal::from(30),
            },
            Perk {
                name: "Discount Coupon".to_string(),
                cost: Decimal::from(20),
            },
        ])
    }
}
