//! External collaborator interfaces
//!
//! The core consumes the asset primitive, the admin gate, and the sequence
//! clock through these traits; the host wires real implementations in. The
//! in-memory implementations here back the server binary's skeleton wiring
//! and the test suites.

use crate::contain::{ObserverError, Stipend};
use crate::error::{Error, Result};
use crate::types::{AccountId, UnitId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ownership view of the governed collection
///
/// The asset primitive itself (transfer/mint/burn mechanics) lives outside
/// the core; the core only ever asks who holds a unit and whether a caller
/// may act for that holder.
pub trait OwnershipOracle: Send + Sync {
    /// Current holder of a unit; fails if the unit does not exist
    fn holder_of(&self, unit: UnitId) -> Result<AccountId>;

    /// Whether `caller` is approved to act on `holder`'s units
    fn is_approved_operator(&self, holder: &AccountId, caller: &AccountId, unit: UnitId) -> bool;
}

/// Administrative capability check
pub trait AdminGate: Send + Sync {
    /// Whether the caller may change ledger configuration
    fn is_admin(&self, caller: &AccountId) -> bool;
}

/// The host's monotonic call-ordering clock
///
/// This must be the globally-agreed linear order of mutating calls (a
/// block/slot counter), never wall-clock time: historical queries resolve
/// against it at consensus time.
pub trait SequenceClock: Send + Sync {
    /// Current sequence point (monotonically non-decreasing)
    fn current_sequence_point(&self) -> u64;
}

/// Untrusted callback notified when a unit is minted
///
/// Runs inside the containment boundary of [`crate::contain`]; any failure
/// is absorbed and journaled, never propagated into the mint.
pub trait UnitObserver: Send + Sync {
    /// Called once per mint with a fuel stipend to spend
    fn unit_minted(
        &self,
        unit: UnitId,
        holder: &AccountId,
        stipend: &mut Stipend,
    ) -> std::result::Result<(), ObserverError>;
}

/// The full set of collaborators the ledger is opened with
pub struct ExternalHooks {
    /// Asset ownership view
    pub ownership: Arc<dyn OwnershipOracle>,
    /// Administrative gate
    pub admin: Arc<dyn AdminGate>,
    /// Sequence clock
    pub clock: Arc<dyn SequenceClock>,
    /// Optional mint observer (contained)
    pub observer: Option<Arc<dyn UnitObserver>>,
}

/// Manually advanced sequence clock
///
/// The host environment normally supplies the clock; this one is for
/// harnesses that drive the ledger directly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at the given sequence point
    pub fn starting_at(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Advance the clock by `ticks`
    pub fn advance(&self, ticks: u64) {
        self.now.fetch_add(ticks, Ordering::SeqCst);
    }
}

impl SequenceClock for ManualClock {
    fn current_sequence_point(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// In-memory ownership registry
///
/// Tracks holders and operator approvals in process memory. The registry is
/// a collaborator, not part of the ledger: callers mutate it first, then
/// report the change through `ownership_changed`.
#[derive(Debug, Default)]
pub struct InMemoryOwnership {
    holders: RwLock<HashMap<UnitId, AccountId>>,
    operators: RwLock<HashSet<(AccountId, AccountId)>>,
}

impl InMemoryOwnership {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `account` as the holder of `unit`
    pub fn set_holder(&self, unit: UnitId, account: AccountId) {
        self.holders.write().insert(unit, account);
    }

    /// Remove a unit from the registry (burn)
    pub fn remove(&self, unit: UnitId) {
        self.holders.write().remove(&unit);
    }

    /// Approve `operator` to act on all of `holder`'s units
    pub fn approve_operator(&self, holder: AccountId, operator: AccountId) {
        self.operators.write().insert((holder, operator));
    }
}

impl OwnershipOracle for InMemoryOwnership {
    fn holder_of(&self, unit: UnitId) -> Result<AccountId> {
        self.holders
            .read()
            .get(&unit)
            .cloned()
            .ok_or(Error::UnitNotFound(unit))
    }

    fn is_approved_operator(&self, holder: &AccountId, caller: &AccountId, _unit: UnitId) -> bool {
        self.operators
            .read()
            .contains(&(holder.clone(), caller.clone()))
    }
}

/// Admin gate backed by an explicit account list
#[derive(Debug, Default)]
pub struct AdminList {
    admins: RwLock<HashSet<AccountId>>,
}

impl AdminList {
    /// Create an empty gate (nobody is an admin)
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant admin capability to an account
    pub fn grant(&self, account: AccountId) {
        self.admins.write().insert(account);
    }
}

impl AdminGate for AdminList {
    fn is_admin(&self, caller: &AccountId) -> bool {
        self.admins.read().contains(caller)
    }
}
