//! Error types for the donation ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Caller lacks the required role (owner / registered organization)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Organization is already in the registry
    #[error("Organization already registered: {0}")]
    AlreadyRegistered(String),

    /// Organization is not in the registry
    #[error("Unknown organization: {0}")]
    UnknownOrganization(String),

    /// Non-positive or over-precise amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Withdrawal or transfer exceeds available funds
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount requested
        requested: rust_decimal::Decimal,
        /// Amount available
        available: rust_decimal::Decimal,
    },

    /// Token spend exceeds the approved allowance
    #[error("Insufficient allowance: requested {requested}, approved {approved}")]
    InsufficientAllowance {
        /// Amount requested
        requested: rust_decimal::Decimal,
        /// Amount approved
        approved: rust_decimal::Decimal,
    },

    /// Fixed-supply reserve cannot cover a reward
    #[error("Reward supply exhausted: need {needed}, reserve holds {reserve}")]
    SupplyExhausted {
        /// Tokens needed
        needed: rust_decimal::Decimal,
        /// Tokens left in the reserve
        reserve: rust_decimal::Decimal,
    },

    /// Donation rejected because its reward could not be issued
    #[error("Reward issuance failed: {0}")]
    RewardIssuanceFailed(#[source] Box<Error>),

    /// Withdrawal attempted while another one for the same organization is in flight
    #[error("Re-entrant withdrawal rejected for {0}")]
    ReentrancyRejected(String),

    /// Malformed account address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Checked arithmetic overflowed
    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON error (read-model files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invariant violation (hash chain, replay drift, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for domain rejections, which leave ledger state untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized(_)
                | Error::AlreadyRegistered(_)
                | Error::UnknownOrganization(_)
                | Error::InvalidAmount(_)
                | Error::InsufficientBalance { .. }
                | Error::InsufficientAllowance { .. }
                | Error::SupplyExhausted { .. }
                | Error::RewardIssuanceFailed(_)
                | Error::ReentrancyRejected(_)
                | Error::InvalidAddress(_)
                | Error::ArithmeticOverflow(_)
        )
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "unauthorized",
            Error::AlreadyRegistered(_) => "already_registered",
            Error::UnknownOrganization(_) => "unknown_organization",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::InsufficientAllowance { .. } => "insufficient_allowance",
            Error::SupplyExhausted { .. } => "supply_exhausted",
            Error::RewardIssuanceFailed(_) => "reward_issuance_failed",
            Error::ReentrancyRejected(_) => "reentrancy_rejected",
            Error::InvalidAddress(_) => "invalid_address",
            Error::ArithmeticOverflow(_) => "arithmetic_overflow",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Json(_) => "json",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
