//! Error types for the vote ledger

use crate::types::{AccountId, UnitId, VotePower};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every variant produced by an invariant check aborts the whole call with
/// no partial state change; there is no retry inside the core.
#[derive(Error, Debug)]
pub enum Error {
    /// Debiting an account below zero (caller invariant violation)
    #[error("voting power underflow for {account}: have {have}, need {need}")]
    Underflow {
        /// Account that was short
        account: AccountId,
        /// Power the account held
        have: VotePower,
        /// Power the debit required
        need: VotePower,
    },

    /// Crediting an account past the maximum representable power
    #[error("voting power overflow for {account}")]
    Overflow {
        /// Account whose credit overflowed
        account: AccountId,
    },

    /// The null account cannot receive delegations
    #[error("invalid delegate: the null account cannot receive delegations")]
    InvalidDelegate,

    /// Batch call exceeds the configured length limit
    #[error("batch of {len} units exceeds the limit of {limit}")]
    BatchTooLarge {
        /// Units in the rejected batch
        len: usize,
        /// Configured limit
        limit: usize,
    },

    /// Historical queries must be strictly in the past
    #[error("sequence point {requested} is not in the past (current is {current})")]
    FutureQuery {
        /// Queried sequence point
        requested: u64,
        /// Current sequence point at query time
        current: u64,
    },

    /// The queried sequence point was evicted from the ring
    ///
    /// After an eviction the ledger cannot distinguish "never happened"
    /// from "happened but forgotten", so it refuses to answer.
    #[error("history at sequence point {requested} has been pruned (oldest retained is {oldest})")]
    HistoryPruned {
        /// Queried sequence point
        requested: u64,
        /// Oldest checkpoint still retained
        oldest: u64,
    },

    /// Unit does not exist in the ownership registry
    #[error("unit not found: {0}")]
    UnitNotFound(UnitId),

    /// Caller lacks the capability for this operation
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Ring capacity cannot change after minting has begun
    #[error("ring capacity is locked once any unit has been minted")]
    CapacityLocked,

    /// Internal invariant violation (sequence regression, counter drift, etc.)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage error (RocksDB)
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Metrics registration error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("concurrency error: {0}")]
    Concurrency(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}
