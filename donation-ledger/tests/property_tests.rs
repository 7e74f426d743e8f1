//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Balance: collected == Σ(donations) - Σ(withdrawals) ≥ 0
//! - Rewards: every donation of A issues exactly A × 1000 tokens
//! - Rejections leave the state untouched
//! - Deterministic replay: Same events → same state

use donation_ledger::{
    crypto,
    state::GenesisParams,
    Address, Command, Error, LedgerEvent, LedgerState, SupplyModel,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

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

/// Ledger with `orgs` registered organizations
fn ledger_with_orgs(orgs: u8) -> LedgerState {
    let mut state = LedgerState::new(
        GenesisParams {
            owner: owner(),
            initial_supply: Decimal::ZERO,
            supply_model: SupplyModel::Mint,
            reward_multiplier: Decimal::from(1000),
        },
        T0,
    )
    .unwrap();
    for n in 0..orgs {
        state
            .execute(
                &owner(),
                Command::RegisterOrganization { organization: org(n) },
                T0,
            )
            .unwrap();
    }
    state
}

/// Strategy for generating valid amounts (positive, up to 18 decimals)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2)),
        (1i64..1_000_000_000_000_000_000i64).prop_map(|wei| Decimal::new(wei, 18)),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Donate { donor: u8, org: u8, amount: Decimal },
    Withdraw { org: u8, amount: Decimal },
    Transfer { from: u8, to: u8, amount: Decimal },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, 0u8..3, amount_strategy())
            .prop_map(|(donor, org, amount)| Op::Donate { donor, org, amount }),
        (0u8..3, amount_strategy()).prop_map(|(org, amount)| Op::Withdraw { org, amount }),
        (0u8..4, 0u8..4, amount_strategy())
            .prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
    ]
}

fn run(state: &mut LedgerState, op: &Op, now: i64) -> Result<LedgerEvent, Error> {
    match op {
        Op::Donate { donor: d, org: o, amount } => state.execute(
            &donor(*d),
            Command::Donate {
                organization: org(*o),
                amount: *amount,
            },
            now,
        ),
        Op::Withdraw { org: o, amount } => {
            state.execute(&org(*o), Command::Withdraw { amount: *amount }, now)
        }
        Op::Transfer { from, to, amount } => state.execute(
            &donor(*from),
            Command::Transfer {
                to: donor(*to),
                amount: *amount,
            },
            now,
        ),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Balances track donations minus withdrawals and never go negative
    #[test]
    fn prop_balance_conservation(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut state = ledger_with_orgs(3);
        let mut donated = [Decimal::ZERO; 3];
        let mut withdrawn = [Decimal::ZERO; 3];

        for (i, op) in ops.iter().enumerate() {
            let before = state.clone();
            match (run(&mut state, op, T0 + i as i64), op) {
                (Ok(_), Op::Donate { org, amount, .. }) => donated[*org as usize] += *amount,
                (Ok(_), Op::Withdraw { org, amount }) => withdrawn[*org as usize] += *amount,
                (Ok(_), Op::Transfer { .. }) => {}
                (Err(e), _) => {
                    prop_assert!(e.is_rejection());
                    prop_assert_eq!(&state, &before);
                }
            }
        }

        for n in 0..3u8 {
            let balance = state.get_balance(&org(n));
            prop_assert_eq!(balance, donated[n as usize] - withdrawn[n as usize]);
            prop_assert!(balance >= Decimal::ZERO);
        }
        state.check_invariants().unwrap();
    }

    /// Every donation issues exactly amount × 1000 reward tokens
    #[test]
    fn prop_reward_is_multiplier_times_amount(amount in amount_strategy()) {
        let mut state = ledger_with_orgs(1);
        let before = state.token().balance_of(&donor(0));

        let event = state
            .execute(
                &donor(0),
                Command::Donate { organization: org(0), amount },
                T0,
            )
            .unwrap();
        let record = event.as_donation().unwrap();

        prop_assert_eq!(record.reward, amount * Decimal::from(1000));
        prop_assert_eq!(
            state.token().balance_of(&donor(0)) - before,
            amount * Decimal::from(1000)
        );
        prop_assert_eq!(state.get_total_donations(&donor(0)), amount);
    }

    /// Donating to an unregistered address is rejected with no change
    #[test]
    fn prop_unknown_organization_rejected(amount in amount_strategy(), stranger in 10u8..200) {
        let mut state = ledger_with_orgs(2);
        let before = state.clone();

        let err = state
            .execute(
                &donor(0),
                Command::Donate { organization: org(stranger), amount },
                T0,
            )
            .unwrap_err();

        prop_assert!(matches!(err, Error::UnknownOrganization(_)));
        prop_assert_eq!(state, before);
    }

    /// Withdrawing more than the balance is rejected with no change
    #[test]
    fn prop_over_withdraw_rejected(
        donated in amount_strategy(),
        excess in amount_strategy(),
    ) {
        let mut state = ledger_with_orgs(1);
        state
            .execute(&donor(0), Command::Donate { organization: org(0), amount: donated }, T0)
            .unwrap();
        let before = state.clone();

        let err = state
            .execute(&org(0), Command::Withdraw { amount: donated + excess }, T0)
            .unwrap_err();

        let is_insufficient = matches!(err, Error::InsufficientBalance { .. });
        prop_assert!(is_insufficient);
        prop_assert_eq!(state, before);
    }

    /// Registering twice fails; the registry is unchanged
    #[test]
    fn prop_duplicate_registration_rejected(n in 0u8..5) {
        let mut state = ledger_with_orgs(5);
        let before = state.clone();

        let err = state
            .execute(&owner(), Command::RegisterOrganization { organization: org(n) }, T0)
            .unwrap_err();

        prop_assert!(matches!(err, Error::AlreadyRegistered(_)));
        prop_assert_eq!(state.get_organizations().len(), 5);
        prop_assert_eq!(state, before);
    }

    /// Replaying the committed events reproduces the state exactly
    #[test]
    fn prop_deterministic_replay(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let genesis = LedgerState::genesis_event(
            GenesisParams {
                owner: owner(),
                initial_supply: Decimal::ZERO,
                supply_model: SupplyModel::Mint,
                reward_multiplier: Decimal::from(1000),
            },
            T0,
        )
        .unwrap();
        let mut state = LedgerState::from_genesis(&genesis).unwrap();
        let mut log = vec![genesis];

        for n in 0..3 {
            log.push(
                state
                    .execute(&owner(), Command::RegisterOrganization { organization: org(n) }, T0)
                    .unwrap(),
            );
        }
        for (i, op) in ops.iter().enumerate() {
            if let Ok(event) = run(&mut state, op, T0 + i as i64) {
                log.push(event);
            }
        }

        crypto::verify_chain(&log).unwrap();
        let replayed = LedgerState::replay(&log).unwrap();
        prop_assert_eq!(replayed, state);
    }
}

#[test]
fn test_tampered_log_fails_replay() {
    let genesis = LedgerState::genesis_event(
        GenesisParams {
            owner: owner(),
            initial_supply: Decimal::ZERO,
            supply_model: SupplyModel::Mint,
            reward_multiplier: Decimal::from(1000),
        },
        T0,
    )
    .unwrap();
    let mut state = LedgerState::from_genesis(&genesis).unwrap();
    let registered = state
        .execute(&owner(), Command::RegisterOrganization { organization: org(0) }, T0)
        .unwrap();
    let mut donation = state
        .execute(
            &donor(0),
            Command::Donate {
                organization: org(0),
                amount: Decimal::ONE,
            },
            T0,
        )
        .unwrap();

    // inflate the donation after the fact
    if let donation_ledger::EventKind::Donated { amount, .. } = &mut donation.kind {
        *amount = Decimal::from(1_000_000);
    }

    let log = vec![genesis, registered, donation];
    assert!(crypto::verify_chain(&log).is_err());
    assert!(LedgerState::replay(&log).is_err());
}
