//! Donation Ledger Core
//!
//! Donation ledger with an attached reward token, backed by an
//! append-only, hash-chained event log.
//!
//! # Architecture
//!
//! - **Event Sourcing**: All state is derived from immutable events
//! - **Single Writer**: One actor task totally orders every state change
//! - **Hash Chain**: Each event commits to its predecessor's SHA-256 hash
//! - **Read Models**: Client-side caches are advisory and reconciled from the log
//!
//! # Invariants
//!
//! - Balance: collected(org) == Σ(donations) - Σ(withdrawals) ≥ 0
//! - Custody: custody == Σ(collected)
//! - Rewards: every donation of `A` issues exactly `A × 1000` tokens, atomically
//! - Token supply: Σ(balances) == total supply
//! - Deterministic replay: Same events → same state

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod token;
pub mod state;
pub mod storage;
pub mod ledger;
pub mod crypto;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;
pub mod read_model;
pub mod session;

// Re-exports
pub use error::{Error, Result};
pub use types::{Address, DonationRecord, EventKind, LedgerEvent, Role, WithdrawalRecord};
pub use state::{Command, LedgerState};
pub use token::{RewardCatalog, RewardToken, SupplyModel, TokenMetadata};
pub use storage::Storage;
pub use ledger::Ledger;
pub use config::Config;
pub use read_model::ReadModelCache;
pub use session::{Dashboard, Session};
