//! Donation ledger state machine
//!
//! All state is derived from the event log. A command is first
//! *prepared* against the current state (every precondition is checked and
//! a sealed event is produced without touching anything), and the event is
//! then *applied*. Applying re-runs the same checks before mutating, so a
//! replayed log that does not fit the state is rejected instead of being
//! half-applied.
//!
//! # Invariants
//!
//! - `collected[org]` == Σ(donations to org) - Σ(withdrawals by org) ≥ 0
//! - `total_donated[donor]` == Σ(donations by donor)
//! - `custody` == Σ(collected)
//! - reward per donation == amount × reward multiplier, issued atomically
//! - Deterministic replay: same events → same state

use crate::{
    crypto::{self, GENESIS_PREVIOUS_HASH},
    token::{RewardToken, SupplyModel},
    types::{checked_add, ensure_valid_amount, Address, EventKind, LedgerEvent, Role, WithdrawalRecord},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// State-changing request submitted by `caller`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Owner adds an organization
    RegisterOrganization {
        /// Organization to register
        organization: Address,
    },
    /// Caller donates `amount` to `organization`
    Donate {
        /// Recipient
        organization: Address,
        /// Value attached to the call
        amount: Decimal,
    },
    /// Registered organization withdraws collected funds
    Withdraw {
        /// Amount to withdraw
        amount: Decimal,
    },
    /// Caller sends reward tokens
    Transfer {
        /// Recipient
        to: Address,
        /// Token amount
        amount: Decimal,
    },
    /// Caller sets an allowance
    Approve {
        /// Spender
        spender: Address,
        /// Allowance
        amount: Decimal,
    },
    /// Owner tops up the reward reserve
    FundContract {
        /// Token amount
        amount: Decimal,
    },
}

impl Command {
    /// Operation name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Command::RegisterOrganization { .. } => "register_organization",
            Command::Donate { .. } => "donate",
            Command::Withdraw { .. } => "withdraw",
            Command::Transfer { .. } => "transfer",
            Command::Approve { .. } => "approve",
            Command::FundContract { .. } => "fund_contract",
        }
    }
}

/// Parameters fixed at deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisParams {
    /// Contract owner
    pub owner: Address,
    /// Tokens minted to the owner
    pub initial_supply: Decimal,
    /// Reward sourcing
    pub supply_model: SupplyModel,
    /// Reward tokens per donated unit
    pub reward_multiplier: Decimal,
}

/// Authoritative ledger state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerState {
    owner: Address,
    reward_multiplier: Decimal,

    /// Registration order
    organizations: Vec<Address>,
    /// Presence == registered
    collected: HashMap<Address, Decimal>,
    total_donated: HashMap<Address, Decimal>,
    withdrawals: HashMap<Address, Vec<WithdrawalRecord>>,
    /// Released to each organization's external account
    paid_out: HashMap<Address, Decimal>,
    /// Native funds held on behalf of organizations
    custody: Decimal,

    token: RewardToken,

    withdrawals_in_flight: HashSet<Address>,

    last_sequence: u64,
    last_hash: [u8; 32],
    last_timestamp_nanos: i64,
}

impl LedgerState {
    /// Build the sealed genesis event
    pub fn genesis_event(params: GenesisParams, timestamp_nanos: i64) -> Result<LedgerEvent> {
        crypto::seal(LedgerEvent {
            sequence: 0,
            event_id: Uuid::now_v7(),
            timestamp_nanos,
            kind: EventKind::Genesis {
                owner: params.owner,
                initial_supply: params.initial_supply,
                supply_model: params.supply_model,
                reward_multiplier: params.reward_multiplier,
            },
            previous_hash: GENESIS_PREVIOUS_HASH,
            hash: [0u8; 32],
        })
    }

    /// Initialize state from a genesis event
    pub fn from_genesis(event: &LedgerEvent) -> Result<Self> {
        crypto::verify_link(None, &GENESIS_PREVIOUS_HASH, event)?;

        let EventKind::Genesis {
            owner,
            initial_supply,
            supply_model,
            reward_multiplier,
        } = &event.kind
        else {
            return Err(Error::InvariantViolation(format!(
                "log must start with Genesis, found {}",
                event.kind.name()
            )));
        };

        if *reward_multiplier <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "reward multiplier must be positive, got {}",
                reward_multiplier
            )));
        }

        Ok(Self {
            owner: owner.clone(),
            reward_multiplier: *reward_multiplier,
            organizations: Vec::new(),
            collected: HashMap::new(),
            total_donated: HashMap::new(),
            withdrawals: HashMap::new(),
            paid_out: HashMap::new(),
            custody: Decimal::ZERO,
            token: RewardToken::new(owner.clone(), *supply_model, *initial_supply)?,
            withdrawals_in_flight: HashSet::new(),
            last_sequence: 0,
            last_hash: event.hash,
            last_timestamp_nanos: event.timestamp_nanos,
        })
    }

    /// Fresh in-memory ledger (genesis at `timestamp_nanos`)
    pub fn new(params: GenesisParams, timestamp_nanos: i64) -> Result<Self> {
        Self::from_genesis(&Self::genesis_event(params, timestamp_nanos)?)
    }

    /// Rebuild state by replaying a full log
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Result<Self> {
        let mut events = events.into_iter();
        let genesis = events
            .next()
            .ok_or_else(|| Error::InvariantViolation("cannot replay an empty log".to_string()))?;

        let mut state = Self::from_genesis(genesis)?;
        for event in events {
            state.apply(event)?;
        }
        Ok(state)
    }

    /// Validate `command` and produce the event it would commit
    ///
    /// Nothing is mutated; a rejection leaves the state exactly as it was.
    pub fn prepare(
        &self,
        caller: &Address,
        command: &Command,
        now_nanos: i64,
    ) -> Result<LedgerEvent> {
        let kind = match command {
            Command::RegisterOrganization { organization } => {
                if caller != &self.owner {
                    return Err(Error::Unauthorized(format!(
                        "{} is not the owner and cannot register organizations",
                        caller
                    )));
                }
                self.check_registration(organization)?;
                EventKind::OrganizationRegistered {
                    organization: organization.clone(),
                }
            }

            Command::Donate {
                organization,
                amount,
            } => {
                let reward = self.check_donation(caller, organization, *amount)?;
                EventKind::Donated {
                    donor: caller.clone(),
                    organization: organization.clone(),
                    amount: *amount,
                    reward,
                }
            }

            Command::Withdraw { amount } => {
                self.check_withdrawal(caller, *amount)?;
                EventKind::Withdrawn {
                    organization: caller.clone(),
                    amount: *amount,
                }
            }

            Command::Transfer { to, amount } => {
                self.token.check_transfer(caller, *amount)?;
                EventKind::TokensTransferred {
                    from: caller.clone(),
                    to: to.clone(),
                    amount: *amount,
                }
            }

            Command::Approve { spender, amount } => {
                if *amount < Decimal::ZERO {
                    return Err(Error::InvalidAmount(format!(
                        "allowance must not be negative, got {}",
                        amount
                    )));
                }
                EventKind::TokensApproved {
                    owner: caller.clone(),
                    spender: spender.clone(),
                    amount: *amount,
                }
            }

            Command::FundContract { amount } => {
                self.token.check_fund_reserve(caller, *amount)?;
                EventKind::ContractFunded {
                    from: caller.clone(),
                    amount: *amount,
                }
            }
        };

        crypto::seal(LedgerEvent {
            sequence: self.last_sequence + 1,
            event_id: Uuid::now_v7(),
            timestamp_nanos: now_nanos.max(self.last_timestamp_nanos),
            kind,
            previous_hash: self.last_hash,
            hash: [0u8; 32],
        })
    }

    /// Apply a committed event
    pub fn apply(&mut self, event: &LedgerEvent) -> Result<()> {
        crypto::verify_link(Some(self.last_sequence), &self.last_hash, event)?;

        if event.timestamp_nanos < self.last_timestamp_nanos {
            return Err(Error::InvariantViolation(format!(
                "event {} is older than its predecessor",
                event.sequence
            )));
        }

        match &event.kind {
            EventKind::Genesis { .. } => {
                return Err(Error::InvariantViolation(format!(
                    "unexpected Genesis at sequence {}",
                    event.sequence
                )));
            }

            EventKind::OrganizationRegistered { organization } => {
                self.check_registration(organization)?;
                self.organizations.push(organization.clone());
                self.collected.insert(organization.clone(), Decimal::ZERO);
            }

            EventKind::Donated {
                donor,
                organization,
                amount,
                reward,
            } => {
                let expected = self.check_donation(donor, organization, *amount)?;
                if expected != *reward {
                    return Err(Error::InvariantViolation(format!(
                        "donation {} carries reward {}, expected {}",
                        event.sequence, reward, expected
                    )));
                }

                let collected = checked_add(self.get_balance(organization), *amount)?;
                let total_donated = checked_add(self.get_total_donations(donor), *amount)?;
                let custody = checked_add(self.custody, *amount)?;

                // Reward first: if it cannot be issued nothing else moves.
                self.token
                    .mint_or_transfer(donor, *reward)
                    .map_err(|e| Error::RewardIssuanceFailed(Box::new(e)))?;

                self.collected.insert(organization.clone(), collected);
                self.total_donated.insert(donor.clone(), total_donated);
                self.custody = custody;
            }

            EventKind::Withdrawn {
                organization,
                amount,
            } => {
                self.check_withdrawal(organization, *amount)?;
                let paid_out = checked_add(self.paid_out(organization), *amount)?;

                self.withdrawals_in_flight.insert(organization.clone());

                // Effects before the payout so a re-entrant call sees the new balance.
                if let Some(balance) = self.collected.get_mut(organization) {
                    *balance -= *amount;
                }
                self.withdrawals
                    .entry(organization.clone())
                    .or_default()
                    .push(WithdrawalRecord {
                        sequence: event.sequence,
                        event_id: event.event_id,
                        organization: organization.clone(),
                        amount: *amount,
                        timestamp: event.timestamp(),
                    });

                self.release_custody(organization, *amount, paid_out);

                self.withdrawals_in_flight.remove(organization);
            }

            EventKind::TokensTransferred { from, to, amount } => {
                self.token.transfer(from, to, *amount)?;
            }

            EventKind::TokensApproved {
                owner,
                spender,
                amount,
            } => {
                self.token.approve(owner, spender, *amount)?;
            }

            EventKind::ContractFunded { from, amount } => {
                self.token.fund_reserve(from, *amount)?;
            }
        }

        self.last_sequence = event.sequence;
        self.last_hash = event.hash;
        self.last_timestamp_nanos = event.timestamp_nanos;
        Ok(())
    }

    /// Prepare and apply in one step (in-memory use)
    pub fn execute(
        &mut self,
        caller: &Address,
        command: Command,
        now_nanos: i64,
    ) -> Result<LedgerEvent> {
        let event = self.prepare(caller, &command, now_nanos)?;
        self.apply(&event)?;
        Ok(event)
    }

    fn check_registration(&self, organization: &Address) -> Result<()> {
        if self.collected.contains_key(organization) {
            return Err(Error::AlreadyRegistered(organization.to_string()));
        }
        Ok(())
    }

    /// Returns the reward the donation earns
    fn check_donation(
        &self,
        donor: &Address,
        organization: &Address,
        amount: Decimal,
    ) -> Result<Decimal> {
        let collected = self
            .collected
            .get(organization)
            .copied()
            .ok_or_else(|| Error::UnknownOrganization(organization.to_string()))?;

        ensure_valid_amount(amount)?;

        let reward = amount.checked_mul(self.reward_multiplier).ok_or_else(|| {
            Error::ArithmeticOverflow(format!("{} × {}", amount, self.reward_multiplier))
        })?;

        checked_add(collected, amount)?;
        checked_add(self.custody, amount)?;
        checked_add(self.get_total_donations(donor), amount)?;

        self.token
            .check_issue(reward)
            .map_err(|e| Error::RewardIssuanceFailed(Box::new(e)))?;

        Ok(reward)
    }

    fn check_withdrawal(&self, organization: &Address, amount: Decimal) -> Result<()> {
        let available = self.collected.get(organization).copied().ok_or_else(|| {
            Error::Unauthorized(format!(
                "{} is not a registered organization",
                organization
            ))
        })?;

        if self.withdrawals_in_flight.contains(organization) {
            return Err(Error::ReentrancyRejected(organization.to_string()));
        }

        ensure_valid_amount(amount)?;

        if amount > available {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        checked_add(self.paid_out(organization), amount)?;

        Ok(())
    }

    fn release_custody(&mut self, organization: &Address, amount: Decimal, paid_out: Decimal) {
        self.custody -= amount;
        self.paid_out.insert(organization.clone(), paid_out);
    }

    // Queries

    /// Contract owner
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Reward tokens per donated unit
    pub fn reward_multiplier(&self) -> Decimal {
        self.reward_multiplier
    }

    /// Collected, not yet withdrawn balance; zero for unknown addresses
    pub fn get_balance(&self, organization: &Address) -> Decimal {
        self.collected
            .get(organization)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Cumulative donations by a donor; zero if they never donated
    pub fn get_total_donations(&self, donor: &Address) -> Decimal {
        self.total_donated
            .get(donor)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Registered organizations in registration order
    pub fn get_organizations(&self) -> &[Address] {
        &self.organizations
    }

    /// Registration check
    pub fn is_organization(&self, account: &Address) -> bool {
        self.collected.contains_key(account)
    }

    /// Role of an account
    pub fn role_of(&self, account: &Address) -> Role {
        if self.is_organization(account) {
            Role::Organization
        } else {
            Role::Donor
        }
    }

    /// Withdrawals by an organization, oldest first
    pub fn get_withdrawal_history(&self, organization: &Address) -> Vec<WithdrawalRecord> {
        self.withdrawals
            .get(organization)
            .cloned()
            .unwrap_or_default()
    }

    /// Funds released to an organization's external account so far
    pub fn paid_out(&self, organization: &Address) -> Decimal {
        self.paid_out
            .get(organization)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Native funds currently held in custody
    pub fn custody_balance(&self) -> Decimal {
        self.custody
    }

    /// Reward token balance sheet
    pub fn token(&self) -> &RewardToken {
        &self.token
    }

    /// Sequence of the last applied event
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Hash of the last applied event
    pub fn last_hash(&self) -> [u8; 32] {
        self.last_hash
    }

    /// Check the cross-cutting balance invariants
    pub fn check_invariants(&self) -> Result<()> {
        let collected: Decimal = self.collected.values().copied().sum();
        if collected != self.custody {
            return Err(Error::InvariantViolation(format!(
                "custody {} != collected {}",
                self.custody, collected
            )));
        }

        if let Some((org, balance)) = self.collected.iter().find(|(_, b)| **b < Decimal::ZERO) {
            return Err(Error::InvariantViolation(format!(
                "negative balance {} for {}",
                balance, org
            )));
        }

        let circulating = self.token.circulating();
        if circulating != self.token.total_supply() {
            return Err(Error::InvariantViolation(format!(
                "token circulation {} != total supply {}",
                circulating,
                self.token.total_supply()
            )));
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn mark_withdrawal_in_flight(&mut self, organization: &Address) {
        self.withdrawals_in_flight.insert(organization.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000_000_000;

    fn owner() -> Address {
        Address::new("0x00000000000000000000000000000000000000aa")
    }

    fn org(n: u8) -> Address {
        Address::new(format!("0x{:040x}", 0x0100 + n as u32))
    }

    fn donor(n: u8) -> Address {
        Address::new(format!("0x{:040x}", 0xd000 + n as u32))
    }

    fn params(model: SupplyModel, initial_supply: Decimal) -> GenesisParams {
        GenesisParams {
            owner: owner(),
            initial_supply,
            supply_model: model,
            reward_multiplier: Decimal::from(1000),
        }
    }

    fn mint_ledger() -> LedgerState {
        LedgerState::new(params(SupplyModel::Mint, Decimal::ZERO), T0).unwrap()
    }

    fn register(state: &mut LedgerState, organization: Address) {
        state
            .execute(
                &owner(),
                Command::RegisterOrganization { organization },
                T0,
            )
            .unwrap();
    }

    #[test]
    fn test_donate_and_withdraw_scenario() {
        let mut state = mint_ledger();
        register(&mut state, org(1));

        let event = state
            .execute(
                &donor(1),
                Command::Donate {
                    organization: org(1),
                    amount: Decimal::new(25, 1),
                },
                T0 + 10,
            )
            .unwrap();
        assert_eq!(event.kind.name(), "Donated");

        assert_eq!(state.get_balance(&org(1)), Decimal::new(25, 1));
        assert_eq!(state.get_total_donations(&donor(1)), Decimal::new(25, 1));
        assert_eq!(state.token().balance_of(&donor(1)), Decimal::from(2500));

        state
            .execute(
                &org(1),
                Command::Withdraw {
                    amount: Decimal::ONE,
                },
                T0 + 20,
            )
            .unwrap();

        assert_eq!(state.get_balance(&org(1)), Decimal::new(15, 1));
        let history = state.get_withdrawal_history(&org(1));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, Decimal::ONE);
        assert_eq!(state.paid_out(&org(1)), Decimal::ONE);
        assert_eq!(state.custody_balance(), Decimal::new(15, 1));
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_donate_unknown_organization_changes_nothing() {
        let mut state = mint_ledger();
        register(&mut state, org(1));
        let before = state.clone();

        let err = state
            .execute(
                &donor(1),
                Command::Donate {
                    organization: org(9),
                    amount: Decimal::ONE,
                },
                T0,
            )
            .unwrap_err();

        assert!(matches!(err, Error::UnknownOrganization(_)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_donate_rejects_non_positive_amount() {
        let mut state = mint_ledger();
        register(&mut state, org(1));

        for amount in [Decimal::ZERO, Decimal::new(-5, 1)] {
            let err = state
                .execute(
                    &donor(1),
                    Command::Donate {
                        organization: org(1),
                        amount,
                    },
                    T0,
                )
                .unwrap_err();
            assert!(matches!(err, Error::InvalidAmount(_)));
        }
        assert_eq!(state.get_balance(&org(1)), Decimal::ZERO);
    }

    #[test]
    fn test_register_requires_owner() {
        let mut state = mint_ledger();
        let err = state
            .execute(
                &donor(1),
                Command::RegisterOrganization {
                    organization: org(1),
                },
                T0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert!(!state.is_organization(&org(1)));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut state = mint_ledger();
        register(&mut state, org(1));

        let err = state
            .execute(
                &owner(),
                Command::RegisterOrganization {
                    organization: org(1),
                },
                T0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(_)));
        assert_eq!(state.get_organizations(), &[org(1)]);
    }

    #[test]
    fn test_withdraw_more_than_balance() {
        let mut state = mint_ledger();
        register(&mut state, org(1));
        state
            .execute(
                &donor(1),
                Command::Donate {
                    organization: org(1),
                    amount: Decimal::ONE,
                },
                T0,
            )
            .unwrap();

        let err = state
            .execute(
                &org(1),
                Command::Withdraw {
                    amount: Decimal::TWO,
                },
                T0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(state.get_balance(&org(1)), Decimal::ONE);
    }

    #[test]
    fn test_withdraw_by_non_organization() {
        let mut state = mint_ledger();
        let err = state
            .execute(
                &donor(1),
                Command::Withdraw {
                    amount: Decimal::ONE,
                },
                T0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_reentrant_withdrawal_rejected() {
        let mut state = mint_ledger();
        register(&mut state, org(1));
        state
            .execute(
                &donor(1),
                Command::Donate {
                    organization: org(1),
                    amount: Decimal::TWO,
                },
                T0,
            )
            .unwrap();

        state.mark_withdrawal_in_flight(&org(1));
        let err = state
            .execute(
                &org(1),
                Command::Withdraw {
                    amount: Decimal::ONE,
                },
                T0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ReentrancyRejected(_)));
        assert_eq!(state.get_balance(&org(1)), Decimal::TWO);
    }

    #[test]
    fn test_fixed_supply_exhaustion_is_atomic() {
        let mut state =
            LedgerState::new(params(SupplyModel::Fixed, Decimal::from(1_000_000)), T0).unwrap();
        register(&mut state, org(1));
        let before = state.clone();

        let err = state
            .execute(
                &donor(1),
                Command::Donate {
                    organization: org(1),
                    amount: Decimal::ONE,
                },
                T0,
            )
            .unwrap_err();
        match err {
            Error::RewardIssuanceFailed(source) => {
                assert!(matches!(*source, Error::SupplyExhausted { .. }))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(state, before);

        let reserve = state.token().reserve().clone();
        state
            .execute(
                &owner(),
                Command::Approve {
                    spender: reserve,
                    amount: Decimal::from(5000),
                },
                T0,
            )
            .unwrap();
        state
            .execute(
                &owner(),
                Command::FundContract {
                    amount: Decimal::from(5000),
                },
                T0,
            )
            .unwrap();

        state
            .execute(
                &donor(1),
                Command::Donate {
                    organization: org(1),
                    amount: Decimal::TWO,
                },
                T0,
            )
            .unwrap();
        assert_eq!(state.token().balance_of(&donor(1)), Decimal::from(2000));
        assert_eq!(state.token().reserve_balance(), Decimal::from(3000));
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_fund_contract_requires_owner() {
        let mut state =
            LedgerState::new(params(SupplyModel::Fixed, Decimal::from(100)), T0).unwrap();
        let err = state
            .execute(
                &donor(1),
                Command::FundContract {
                    amount: Decimal::from(10),
                },
                T0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let mut state = mint_ledger();
        let first = state
            .execute(
                &owner(),
                Command::RegisterOrganization {
                    organization: org(1),
                },
                T0 + 100,
            )
            .unwrap();
        let second = state
            .execute(
                &owner(),
                Command::RegisterOrganization {
                    organization: org(2),
                },
                T0 + 50,
            )
            .unwrap();
        assert!(second.timestamp_nanos >= first.timestamp_nanos);
    }

    #[test]
    fn test_replay_reproduces_state() {
        let genesis = LedgerState::genesis_event(params(SupplyModel::Mint, Decimal::ZERO), T0)
            .unwrap();
        let mut state = LedgerState::from_genesis(&genesis).unwrap();

        let mut log = vec![genesis];
        log.push(
            state
                .execute(
                    &owner(),
                    Command::RegisterOrganization {
                        organization: org(1),
                    },
                    T0 + 1,
                )
                .unwrap(),
        );
        log.push(
            state
                .execute(
                    &donor(1),
                    Command::Donate {
                        organization: org(1),
                        amount: Decimal::new(75, 2),
                    },
                    T0 + 2,
                )
                .unwrap(),
        );
        log.push(
            state
                .execute(
                    &org(1),
                    Command::Withdraw {
                        amount: Decimal::new(25, 2),
                    },
                    T0 + 3,
                )
                .unwrap(),
        );

        let replayed = LedgerState::replay(&log).unwrap();
        assert_eq!(replayed, state);
    }

    #[test]
    fn test_apply_rejects_foreign_event() {
        let mut state = mint_ledger();
        let event = state
            .prepare(
                &owner(),
                &Command::RegisterOrganization {
                    organization: org(1),
                },
                T0,
            )
            .unwrap();
        state.apply(&event).unwrap();

        // Same event again no longer links to the head of the log
        let err = state.apply(&event).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_redeem_via_transfer_to_reserve() {
        let mut state = mint_ledger();
        register(&mut state, org(1));
        state
            .execute(
                &donor(1),
                Command::Donate {
                    organization: org(1),
                    amount: Decimal::new(1, 1),
                },
                T0,
            )
            .unwrap();
        let reserve = state.token().reserve().clone();

        state
            .execute(
                &donor(1),
                Command::Transfer {
                    to: reserve.clone(),
                    amount: Decimal::from(50),
                },
                T0,
            )
            .unwrap();
        assert_eq!(state.token().balance_of(&donor(1)), Decimal::from(50));
        assert_eq!(state.token().balance_of(&reserve), Decimal::from(50));
    }

    /// 4 × 10^28, a bit over half of `Decimal::MAX`
    fn huge() -> Decimal {
        Decimal::from_i128_with_scale(4 * 10i128.pow(28), 0)
    }

    /// Mint ledger paying 0.001 tokens per unit, so huge donations stay mintable
    fn thin_reward_ledger() -> LedgerState {
        let mut state = LedgerState::new(
            GenesisParams {
                reward_multiplier: Decimal::new(1, 3),
                ..params(SupplyModel::Mint, Decimal::ZERO)
            },
            T0,
        )
        .unwrap();
        register(&mut state, org(1));
        state
    }

    fn donate(state: &mut LedgerState, from: Address, amount: Decimal) -> Result<LedgerEvent> {
        state.execute(
            &from,
            Command::Donate {
                organization: org(1),
                amount,
            },
            T0,
        )
    }

    fn assert_overflow(result: Result<LedgerEvent>) {
        match result {
            Err(Error::ArithmeticOverflow(_)) => {}
            other => panic!("expected ArithmeticOverflow, got {:?}", other),
        }
    }

    #[test]
    fn test_total_donated_overflow_rejected() {
        let mut state = thin_reward_ledger();
        donate(&mut state, donor(1), huge()).unwrap();
        state
            .execute(&org(1), Command::Withdraw { amount: huge() }, T0)
            .unwrap();
        let before = state.clone();

        // collected and custody are back at zero; only the donor total overflows
        assert_overflow(donate(&mut state, donor(1), huge()));
        assert_eq!(state, before);
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_paid_out_overflow_rejected() {
        let mut state = thin_reward_ledger();
        donate(&mut state, donor(1), huge()).unwrap();
        state
            .execute(&org(1), Command::Withdraw { amount: huge() }, T0)
            .unwrap();
        donate(&mut state, donor(2), huge()).unwrap();
        let before = state.clone();

        assert_overflow(state.execute(&org(1), Command::Withdraw { amount: huge() }, T0));
        assert_eq!(state, before);
        assert_eq!(state.paid_out(&org(1)), huge());
    }

    #[test]
    fn test_collected_overflow_rejected() {
        let mut state = thin_reward_ledger();
        donate(&mut state, donor(1), huge()).unwrap();
        let before = state.clone();

        assert_overflow(donate(&mut state, donor(2), huge()));
        assert_eq!(state, before);
        assert_eq!(state.get_balance(&org(1)), huge());
    }

    #[test]
    fn test_reward_multiplication_overflow_rejected() {
        let mut state = mint_ledger();
        register(&mut state, org(1));
        let before = state.clone();

        assert_overflow(donate(&mut state, donor(1), huge()));
        assert_eq!(state, before);
    }

    #[test]
    fn test_minted_supply_overflow_rejected() {
        let mut state = mint_ledger();
        register(&mut state, org(1));
        // 7 × 10^25 earns 7 × 10^28 tokens; a second one cannot be minted
        let amount = Decimal::from_i128_with_scale(7 * 10i128.pow(25), 0);
        donate(&mut state, donor(1), amount).unwrap();
        let before = state.clone();

        match donate(&mut state, donor(2), amount) {
            Err(Error::RewardIssuanceFailed(inner)) => {
                assert!(matches!(*inner, Error::ArithmeticOverflow(_)))
            }
            other => panic!("expected RewardIssuanceFailed, got {:?}", other),
        }
        assert_eq!(state, before);
        assert_eq!(state.token().total_supply(), Decimal::from_i128_with_scale(7 * 10i128.pow(28), 0));
    }
}
