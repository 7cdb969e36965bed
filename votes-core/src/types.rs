//! Core types for the vote ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Checked arithmetic (voting power can never go negative or wrap)

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account identifier (wallet address, principal, etc.)
///
/// The empty string is reserved as the null account: the sink that power
/// returns to on burn and the source it comes from on mint. It is never a
/// valid delegate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved null account
    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a governed unit (one unit, one vote)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UnitId(u64);

impl UnitId {
    /// Create new unit ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Voting power of an account
///
/// Unsigned with checked arithmetic only: a debit below zero or a credit
/// past [`VotePower::MAX`] is reported to the caller, never wrapped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct VotePower(u128);

impl VotePower {
    /// No voting power
    pub const ZERO: VotePower = VotePower(0);

    /// The weight of a single unit
    pub const ONE: VotePower = VotePower(1);

    /// Maximum representable voting power
    pub const MAX: VotePower = VotePower(u128::MAX);

    /// Create from a raw value
    pub fn new(value: u128) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u128 {
        self.0
    }

    /// Whether this is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition; `None` on overflow
    pub fn checked_add(self, other: VotePower) -> Option<VotePower> {
        self.0.checked_add(other.0).map(VotePower)
    }

    /// Checked subtraction; `None` on underflow
    pub fn checked_sub(self, other: VotePower) -> Option<VotePower> {
        self.0.checked_sub(other.0).map(VotePower)
    }
}

impl fmt::Display for VotePower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VotePower {
    fn from(value: u64) -> Self {
        VotePower(value as u128)
    }
}

/// One entry in an account's voting-power history
///
/// Immutable once written, with a single exception: a second write at the
/// same sequence point overwrites the power in place, so one atomic call
/// leaves at most one checkpoint per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Monotonic ordering value the host assigns to mutating calls
    pub sequence_point: u64,

    /// Voting power in effect from this sequence point onward
    pub power: VotePower,
}

/// Domain event appended to the journal by a committed mutating call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A unit's effective delegate changed through an explicit call
    DelegateChanged {
        /// Unit whose delegation changed
        unit: UnitId,
        /// Effective delegate before the call
        previous: AccountId,
        /// Effective delegate after the call
        next: AccountId,
    },

    /// Voting power moved between two accounts (or from/to the null sink)
    PowerMoved {
        /// Debited account; `None` on mint
        from: Option<AccountId>,
        /// Credited account; `None` on burn
        to: Option<AccountId>,
        /// Amount moved
        amount: VotePower,
        /// Sequence point the move was checkpointed at
        sequence_point: u64,
    },

    /// The contained unit observer failed; the mint itself succeeded
    ObserverFailed {
        /// Unit whose mint triggered the observer
        unit: UnitId,
        /// Captured failure, one of: error, stipend exhaustion, panic
        reason: String,
    },

    /// Ring capacity was reconfigured (only possible before the first mint)
    RingCapacityChanged {
        /// New per-account checkpoint capacity
        capacity: u32,
    },

    /// The batch-call length limit was reconfigured
    BatchLimitChanged {
        /// New maximum number of units per batch call
        limit: usize,
    },
}

/// A journaled event with its position and identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic journal index (dense, starts at 0)
    pub index: u64,

    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// The event itself
    pub event: DomainEvent,
}
