//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money and reward tokens)

use crate::token::SupplyModel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum fractional digits accepted for an amount (wei precision)
pub const MAX_AMOUNT_SCALE: u32 = 18;

/// Account address (`0x` + 40 hex digits, stored lowercase)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create an address without format validation
    ///
    /// Used for synthetic accounts (the ledger's reserve) and tests.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_ascii_lowercase())
    }

    /// Parse and validate a hex account address
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let trimmed = raw.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| crate::Error::InvalidAddress(format!("missing 0x prefix: {}", raw)))?;

        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(crate::Error::InvalidAddress(format!(
                "expected 40 hex digits: {}",
                raw
            )));
        }

        Ok(Self::new(trimmed))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

/// Reject non-positive amounts and amounts finer than wei precision
pub fn ensure_valid_amount(amount: Decimal) -> crate::Result<()> {
    if amount <= Decimal::ZERO {
        return Err(crate::Error::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(crate::Error::InvalidAmount(format!(
            "amount {} has more than {} fractional digits",
            amount, MAX_AMOUNT_SCALE
        )));
    }
    Ok(())
}

/// Wall-clock time in nanoseconds since the Unix epoch
///
/// Falls back to 0 outside the representable range; timestamps are clamped
/// to be non-decreasing, so the fallback never moves the log backwards.
pub(crate) fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0)
}

/// Checked decimal addition
pub(crate) fn checked_add(a: Decimal, b: Decimal) -> crate::Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| crate::Error::ArithmeticOverflow(format!("{} + {}", a, b)))
}

/// Committed state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// First event of every log; fixes the owner and token economics
    Genesis {
        /// Contract owner
        owner: Address,
        /// Tokens minted to the owner at deployment
        initial_supply: Decimal,
        /// How rewards are sourced
        supply_model: SupplyModel,
        /// Reward tokens per donated unit
        reward_multiplier: Decimal,
    },

    /// Owner added an organization to the registry
    OrganizationRegistered {
        /// New organization
        organization: Address,
    },

    /// Donation credited to an organization, reward issued to the donor
    Donated {
        /// Sender
        donor: Address,
        /// Recipient organization
        organization: Address,
        /// Donated amount
        amount: Decimal,
        /// Reward tokens issued
        reward: Decimal,
    },

    /// Organization withdrew collected funds
    Withdrawn {
        /// Withdrawing organization
        organization: Address,
        /// Withdrawn amount
        amount: Decimal,
    },

    /// Reward tokens moved between accounts
    TokensTransferred {
        /// Sender
        from: Address,
        /// Recipient
        to: Address,
        /// Token amount
        amount: Decimal,
    },

    /// Allowance set
    TokensApproved {
        /// Token holder
        owner: Address,
        /// Approved spender
        spender: Address,
        /// Allowance (replaces any previous value)
        amount: Decimal,
    },

    /// Owner topped up the reward reserve
    ContractFunded {
        /// Funding account (the owner)
        from: Address,
        /// Token amount
        amount: Decimal,
    },
}

impl EventKind {
    /// Stable name, matching the event names read-models filter on
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Genesis { .. } => "Genesis",
            EventKind::OrganizationRegistered { .. } => "OrganizationRegistered",
            EventKind::Donated { .. } => "Donated",
            EventKind::Withdrawn { .. } => "Withdrawn",
            EventKind::TokensTransferred { .. } => "Transfer",
            EventKind::TokensApproved { .. } => "Approval",
            EventKind::ContractFunded { .. } => "ContractFunded",
        }
    }

    /// Accounts this event touches (used for storage indices)
    pub fn accounts(&self) -> Vec<&Address> {
        match self {
            EventKind::Genesis { owner, .. } => vec![owner],
            EventKind::OrganizationRegistered { organization } => vec![organization],
            EventKind::Donated {
                donor,
                organization,
                ..
            } => vec![donor, organization],
            EventKind::Withdrawn { organization, .. } => vec![organization],
            EventKind::TokensTransferred { from, to, .. } => vec![from, to],
            EventKind::TokensApproved { owner, spender, .. } => vec![owner, spender],
            EventKind::ContractFunded { from, .. } => vec![from],
        }
    }
}

/// Ledger event: one immutable entry of the append-only log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Position in the log (genesis = 0)
    pub sequence: u64,

    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Event timestamp (nanoseconds since Unix epoch)
    pub timestamp_nanos: i64,

    /// State transition
    pub kind: EventKind,

    /// Hash of the previous event (zeroes for genesis)
    pub previous_hash: [u8; 32],

    /// Hash of this event's canonical bytes
    pub hash: [u8; 32],
}

impl LedgerEvent {
    /// Canonical bytes for hashing (everything except `hash`)
    pub fn canonical_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(bincode::serialize(&(
            self.sequence,
            &self.event_id,
            self.timestamp_nanos,
            &self.kind,
            &self.previous_hash,
        ))?)
    }

    /// Event time
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp_nanos)
    }

    /// Donation record view, if this is a `Donated` event
    pub fn as_donation(&self) -> Option<DonationRecord> {
        match &self.kind {
            EventKind::Donated {
                donor,
                organization,
                amount,
                reward,
            } => Some(DonationRecord {
                sequence: self.sequence,
                event_id: self.event_id,
                donor: donor.clone(),
                organization: organization.clone(),
                amount: *amount,
                reward: *reward,
                timestamp: self.timestamp(),
            }),
            _ => None,
        }
    }

    /// Withdrawal record view, if this is a `Withdrawn` event
    pub fn as_withdrawal(&self) -> Option<WithdrawalRecord> {
        match &self.kind {
            EventKind::Withdrawn {
                organization,
                amount,
            } => Some(WithdrawalRecord {
                sequence: self.sequence,
                event_id: self.event_id,
                organization: organization.clone(),
                amount: *amount,
                timestamp: self.timestamp(),
            }),
            _ => None,
        }
    }
}

/// Donation audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRecord {
    /// Log position
    pub sequence: u64,
    /// Event ID
    pub event_id: Uuid,
    /// Sender
    pub donor: Address,
    /// Recipient organization
    pub organization: Address,
    /// Donated amount
    pub amount: Decimal,
    /// Reward tokens issued
    pub reward: Decimal,
    /// Commit time
    pub timestamp: DateTime<Utc>,
}

/// Withdrawal audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    /// Log position
    pub sequence: u64,
    /// Event ID
    pub event_id: Uuid,
    /// Withdrawing organization
    pub organization: Address,
    /// Withdrawn amount
    pub amount: Decimal,
    /// Commit time
    pub timestamp: DateTime<Utc>,
}

/// Role of a connected account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Registered fund recipient
    Organization,
    /// Any other account
    Donor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_nanos_is_a_real_clock_reading() {
        let now = now_nanos();
        assert!(now > 1_600_000_000_000_000_000);
        assert!(now < i64::MAX);
    }

    #[test]
    fn test_address_parse_normalizes_case() {
        let addr = Address::parse("0x5CfE6ef4E8cff3b918224dAC699B20e383370B41").unwrap();
        assert_eq!(addr.as_str(), "0x5cfe6ef4e8cff3b918224dac699b20e383370b41");
        assert_eq!(
            addr,
            Address::parse("0x5cfe6ef4e8cff3b918224dac699b20e383370b41").unwrap()
        );
    }

    #[test]
    fn test_address_parse_rejects_garbage() {
        assert!(Address::parse("5CfE6ef4E8cff3b918224dAC699B20e383370B41").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("0xZZfE6ef4E8cff3b918224dAC699B20e383370B41").is_err());
    }

    #[test]
    fn test_amount_validation() {
        assert!(ensure_valid_amount(Decimal::new(25, 1)).is_ok());
        assert!(ensure_valid_amount(Decimal::ZERO).is_err());
        assert!(ensure_valid_amount(Decimal::new(-1, 0)).is_err());
        // 1e-19 is finer than wei
        assert!(ensure_valid_amount(Decimal::new(1, 19)).is_err());
        // trailing zeros do not count against the scale limit
        assert!(ensure_valid_amount(Decimal::new(10, 19)).is_ok());
    }

    #[test]
    fn test_donation_view() {
        let event = LedgerEvent {
            sequence: 3,
            event_id: Uuid::now_v7(),
            timestamp_nanos: 1_700_000_000_000_000_000,
            kind: EventKind::Donated {
                donor: Address::new("0xd1"),
                organization: Address::new("0x01"),
                amount: Decimal::new(25, 1),
                reward: Decimal::from(2500),
            },
            previous_hash: [0u8; 32],
            hash: [0u8; 32],
        };

        let record = event.as_donation().unwrap();
        assert_eq!(record.sequence, 3);
        assert_eq!(record.reward, Decimal::from(2500));
        assert!(event.as_withdrawal().is_none());
        assert_eq!(event.kind.name(), "Donated");
    }
}
