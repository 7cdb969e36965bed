//! Transactional vote-accounting engine
//!
//! Every mutating call is planned against a staging overlay first: touched
//! rings are cloned, override writes and journal events are buffered, and
//! all invariant checks run before anything is visible. The plan produces a
//! [`ChangeSet`] that the caller commits to storage as one atomic batch and
//! then installs into memory with the infallible [`Engine::apply`]. An
//! error at any point during planning therefore means zero state change:
//! both legs of a power move land together or not at all.

use crate::checkpoint::{CheckpointRing, RecordOutcome};
use crate::config::Config;
use crate::contain;
use crate::delegation::{plan_set_delegate, DelegationMap, DelegationStep};
use crate::error::{Error, Result};
use crate::hooks::ExternalHooks;
use crate::types::{AccountId, DomainEvent, EventRecord, UnitId, VotePower};
use std::collections::HashMap;
use uuid::Uuid;

/// Persisted scalar state, written with every commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    /// Units currently in existence (minted minus burned)
    pub live_units: u64,
    /// Units ever minted; a nonzero value locks the ring capacity
    pub total_minted: u64,
    /// Index the next journal event will take
    pub next_event_index: u64,
    /// Per-account checkpoint capacity
    pub ring_capacity: u32,
    /// Maximum units per batch call
    pub batch_limit: usize,
}

/// Checkpoint write statistics for one committed call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingWriteStats {
    /// Checkpoints appended
    pub appended: u64,
    /// Same-sequence-point overwrites
    pub compressed: u64,
    /// Oldest checkpoints discarded by full rings
    pub evicted: u64,
}

/// The complete effect of one mutating call
///
/// `rings` and `overrides` carry full post-state for everything the call
/// touched; counters are absolute post-commit values.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Post-state of every ring the call touched
    pub rings: Vec<(AccountId, CheckpointRing)>,
    /// Override writes; `None` deletes the entry
    pub overrides: Vec<(UnitId, Option<AccountId>)>,
    /// Scalar state after the call
    pub counters: Counters,
    /// Checkpoint write statistics (metrics feed)
    pub ring_writes: RingWriteStats,
    /// Journal events the call appends
    pub events: Vec<EventRecord>,
}

impl ChangeSet {
    /// Whether the call changed nothing (idempotent no-op)
    pub fn is_noop(&self) -> bool {
        self.rings.is_empty() && self.overrides.is_empty() && self.events.is_empty()
    }
}

/// Full engine state as loaded from storage
#[derive(Debug)]
pub struct EngineSnapshot {
    /// Per-account checkpoint rings
    pub rings: HashMap<AccountId, CheckpointRing>,
    /// Explicit delegate overrides
    pub overrides: HashMap<UnitId, AccountId>,
    /// Scalar state
    pub counters: Counters,
}

/// Staging overlay for one in-flight call
struct Txn<'e> {
    engine: &'e Engine,
    rings: HashMap<AccountId, CheckpointRing>,
    overrides: HashMap<UnitId, Option<AccountId>>,
    events: Vec<DomainEvent>,
    ring_writes: RingWriteStats,
    live_units: u64,
    total_minted: u64,
    ring_capacity: u32,
    batch_limit: usize,
}

impl<'e> Txn<'e> {
    fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            rings: HashMap::new(),
            overrides: HashMap::new(),
            events: Vec::new(),
            ring_writes: RingWriteStats::default(),
            live_units: engine.live_units,
            total_minted: engine.total_minted,
            ring_capacity: engine.ring_capacity,
            batch_limit: engine.batch_limit,
        }
    }

    fn ring_mut(&mut self, account: &AccountId) -> &mut CheckpointRing {
        if !self.rings.contains_key(account) {
            let base = self
                .engine
                .rings
                .get(account)
                .cloned()
                .unwrap_or_else(|| CheckpointRing::new(self.engine.ring_capacity));
            self.rings.insert(account.clone(), base);
        }
        self.rings
            .get_mut(account)
            .expect("staged ring was just inserted")
    }

    fn current_power(&self, account: &AccountId) -> VotePower {
        self.rings
            .get(account)
            .or_else(|| self.engine.rings.get(account))
            .map(|r| r.current_power())
            .unwrap_or(VotePower::ZERO)
    }

    fn override_of(&self, unit: UnitId) -> Option<AccountId> {
        match self.overrides.get(&unit) {
            Some(staged) => staged.clone(),
            None => self.engine.delegation.get(unit).cloned(),
        }
    }

    fn set_override(&mut self, unit: UnitId, delegatee: AccountId) {
        self.overrides.insert(unit, Some(delegatee));
    }

    fn clear_override(&mut self, unit: UnitId) {
        self.overrides.insert(unit, None);
    }

    fn record(
        &mut self,
        account: &AccountId,
        sequence_point: u64,
        power: VotePower,
    ) -> Result<()> {
        match self.ring_mut(account).record(sequence_point, power)? {
            RecordOutcome::Appended => self.ring_writes.appended += 1,
            RecordOutcome::Compressed => self.ring_writes.compressed += 1,
            RecordOutcome::Evicted => {
                self.ring_writes.appended += 1;
                self.ring_writes.evicted += 1;
            }
        }
        Ok(())
    }

    /// Debit `from` and credit `to` within this call's atomicity
    fn move_power(
        &mut self,
        from: Option<&AccountId>,
        to: Option<&AccountId>,
        amount: VotePower,
        sequence_point: u64,
    ) -> Result<()> {
        if amount.is_zero() || from == to {
            return Ok(());
        }

        if let Some(account) = from {
            let have = self.current_power(account);
            let next = have.checked_sub(amount).ok_or_else(|| Error::Underflow {
                account: account.clone(),
                have,
                need: amount,
            })?;
            self.record(account, sequence_point, next)?;
        }

        if let Some(account) = to {
            let have = self.current_power(account);
            let next = have.checked_add(amount).ok_or_else(|| Error::Overflow {
                account: account.clone(),
            })?;
            self.record(account, sequence_point, next)?;
        }

        self.events.push(DomainEvent::PowerMoved {
            from: from.cloned(),
            to: to.cloned(),
            amount,
            sequence_point,
        });
        Ok(())
    }

    fn finish(self) -> ChangeSet {
        let base_index = self.engine.next_event_index;
        let events: Vec<EventRecord> = self
            .events
            .into_iter()
            .enumerate()
            .map(|(i, event)| EventRecord {
                index: base_index + i as u64,
                event_id: Uuid::now_v7(),
                event,
            })
            .collect();

        ChangeSet {
            rings: self.rings.into_iter().collect(),
            overrides: self.overrides.into_iter().collect(),
            counters: Counters {
                live_units: self.live_units,
                total_minted: self.total_minted,
                next_event_index: base_index + events.len() as u64,
                ring_capacity: self.ring_capacity,
                batch_limit: self.batch_limit,
            },
            ring_writes: self.ring_writes,
            events,
        }
    }
}

/// The vote-accounting core: checkpoint rings plus the delegation map
///
/// Mutating methods take `&self` and return a [`ChangeSet`]; the owner
/// commits it to storage and then installs it with [`Engine::apply`]. The
/// split keeps the engine free of storage concerns while making every call
/// atomic end to end.
pub struct Engine {
    rings: HashMap<AccountId, CheckpointRing>,
    delegation: DelegationMap,
    live_units: u64,
    total_minted: u64,
    next_event_index: u64,
    ring_capacity: u32,
    batch_limit: usize,
    observer_stipend: u64,
    hooks: ExternalHooks,
}

impl Engine {
    /// Create a fresh engine from configuration
    pub fn new(config: &Config, hooks: ExternalHooks) -> Self {
        Self {
            rings: HashMap::new(),
            delegation: DelegationMap::new(),
            live_units: 0,
            total_minted: 0,
            next_event_index: 0,
            ring_capacity: config.ring_capacity,
            batch_limit: config.batch_limit,
            observer_stipend: config.observer_stipend,
            hooks,
        }
    }

    /// Rebuild an engine from persisted state
    ///
    /// Persisted counters win over the configuration: ring capacity in
    /// particular is already baked into the stored rings.
    pub fn restore(config: &Config, snapshot: EngineSnapshot, hooks: ExternalHooks) -> Self {
        let mut delegation = DelegationMap::new();
        for (unit, delegatee) in snapshot.overrides {
            delegation.set(unit, delegatee);
        }
        Self {
            rings: snapshot.rings,
            delegation,
            live_units: snapshot.counters.live_units,
            total_minted: snapshot.counters.total_minted,
            next_event_index: snapshot.counters.next_event_index,
            ring_capacity: snapshot.counters.ring_capacity,
            batch_limit: snapshot.counters.batch_limit,
            observer_stipend: config.observer_stipend,
            hooks,
        }
    }

    // Queries

    /// Current voting power of an account (zero if it has no history)
    pub fn current_power(&self, account: &AccountId) -> VotePower {
        self.rings
            .get(account)
            .map(|r| r.current_power())
            .unwrap_or(VotePower::ZERO)
    }

    /// Voting power of an account at a past sequence point
    pub fn historical_power(&self, account: &AccountId, sequence_point: u64) -> Result<VotePower> {
        let current = self.hooks.clock.current_sequence_point();
        if sequence_point >= current {
            return Err(Error::FutureQuery {
                requested: sequence_point,
                current,
            });
        }
        match self.rings.get(account) {
            Some(ring) => ring.power_at(sequence_point),
            None => Ok(VotePower::ZERO),
        }
    }

    /// Effective delegate of a unit: override if set, else the holder
    pub fn effective_delegate(&self, unit: UnitId) -> Result<AccountId> {
        let holder = self.hooks.ownership.holder_of(unit)?;
        Ok(self.delegation.resolve(unit, &holder))
    }

    /// Per-account checkpoint capacity currently in force
    pub fn ring_capacity(&self) -> u32 {
        self.ring_capacity
    }

    /// Batch length limit currently in force
    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Units currently in existence
    pub fn live_units(&self) -> u64 {
        self.live_units
    }

    /// Verify the conservation law: total power equals live units
    pub fn check_conservation(&self) -> Result<bool> {
        let mut total = VotePower::ZERO;
        for ring in self.rings.values() {
            total = total.checked_add(ring.current_power()).ok_or_else(|| {
                Error::InvariantViolation("total voting power overflowed".to_string())
            })?;
        }
        Ok(total == VotePower::from(self.live_units))
    }

    // Mutating operations (plan phase)

    /// Move voting power between accounts
    ///
    /// The primitive every delegation-affecting event reduces to. `None`
    /// legs are the mint source and burn sink. The ledger itself never
    /// initiates a move.
    pub fn move_voting_power(
        &self,
        from: Option<&AccountId>,
        to: Option<&AccountId>,
        amount: VotePower,
    ) -> Result<ChangeSet> {
        let sequence_point = self.hooks.clock.current_sequence_point();
        let mut txn = Txn::new(self);
        txn.move_power(from, to, amount, sequence_point)?;
        Ok(txn.finish())
    }

    /// Delegate a unit's vote to `delegatee`
    pub fn set_delegate(
        &self,
        caller: &AccountId,
        unit: UnitId,
        delegatee: &AccountId,
    ) -> Result<ChangeSet> {
        let sequence_point = self.hooks.clock.current_sequence_point();
        let mut txn = Txn::new(self);
        self.stage_set_delegate(&mut txn, caller, unit, delegatee, sequence_point)?;
        Ok(txn.finish())
    }

    /// Delegate several units in one atomic call
    pub fn set_delegate_batch(
        &self,
        caller: &AccountId,
        units: &[UnitId],
        delegatee: &AccountId,
    ) -> Result<ChangeSet> {
        self.check_batch_len(units.len())?;
        let sequence_point = self.hooks.clock.current_sequence_point();
        let mut txn = Txn::new(self);
        for &unit in units {
            self.stage_set_delegate(&mut txn, caller, unit, delegatee, sequence_point)?;
        }
        Ok(txn.finish())
    }

    /// Remove a unit's explicit delegation, if any
    pub fn clear_delegate(&self, caller: &AccountId, unit: UnitId) -> Result<ChangeSet> {
        let sequence_point = self.hooks.clock.current_sequence_point();
        let mut txn = Txn::new(self);
        self.stage_clear_delegate(&mut txn, caller, unit, sequence_point)?;
        Ok(txn.finish())
    }

    /// Clear several units in one atomic call
    pub fn clear_delegate_batch(&self, caller: &AccountId, units: &[UnitId]) -> Result<ChangeSet> {
        self.check_batch_len(units.len())?;
        let sequence_point = self.hooks.clock.current_sequence_point();
        let mut txn = Txn::new(self);
        for &unit in units {
            self.stage_clear_delegate(&mut txn, caller, unit, sequence_point)?;
        }
        Ok(txn.finish())
    }

    /// React to a mint, transfer, or burn reported by the asset primitive
    ///
    /// `from` is `None` on mint, `to` is `None` on burn. The previous
    /// effective delegate is computed with the old holder; any override is
    /// cleared so the new holder starts from implicit self-delegation.
    pub fn ownership_changed(
        &self,
        unit: UnitId,
        from: Option<&AccountId>,
        to: Option<&AccountId>,
    ) -> Result<ChangeSet> {
        let mut txn = Txn::new(self);

        // Self-transfers must not disturb delegation.
        if from == to {
            return Ok(txn.finish());
        }

        let sequence_point = self.hooks.clock.current_sequence_point();
        let previous = txn.override_of(unit).or_else(|| from.cloned());
        if txn.override_of(unit).is_some() {
            txn.clear_override(unit);
        }
        txn.move_power(previous.as_ref(), to, VotePower::ONE, sequence_point)?;

        match (from, to) {
            (None, Some(holder)) => {
                txn.total_minted += 1;
                txn.live_units += 1;
                self.observe_mint(&mut txn, unit, holder);
            }
            (Some(_), None) => {
                txn.live_units = txn.live_units.checked_sub(1).ok_or_else(|| {
                    Error::InvariantViolation(format!("burn of {unit} with no live units"))
                })?;
            }
            _ => {}
        }

        Ok(txn.finish())
    }

    /// Change the per-account checkpoint capacity (admin, pre-mint only)
    pub fn set_ring_capacity(&self, caller: &AccountId, capacity: u32) -> Result<ChangeSet> {
        self.require_admin(caller)?;
        if capacity == 0 {
            return Err(Error::Config("ring capacity must be at least 1".to_string()));
        }
        if self.total_minted > 0 {
            return Err(Error::CapacityLocked);
        }

        let mut txn = Txn::new(self);
        if capacity != self.ring_capacity {
            txn.ring_capacity = capacity;
            txn.events.push(DomainEvent::RingCapacityChanged { capacity });
        }
        Ok(txn.finish())
    }

    /// Change the batch length limit (admin, any time)
    pub fn set_batch_limit(&self, caller: &AccountId, limit: usize) -> Result<ChangeSet> {
        self.require_admin(caller)?;
        if limit == 0 {
            return Err(Error::Config("batch limit must be at least 1".to_string()));
        }

        let mut txn = Txn::new(self);
        if limit != self.batch_limit {
            txn.batch_limit = limit;
            txn.events.push(DomainEvent::BatchLimitChanged { limit });
        }
        Ok(txn.finish())
    }

    /// Install a committed change set (infallible)
    pub fn apply(&mut self, change: ChangeSet) {
        for (account, ring) in change.rings {
            self.rings.insert(account, ring);
        }
        for (unit, entry) in change.overrides {
            match entry {
                Some(delegatee) => self.delegation.set(unit, delegatee),
                None => {
                    self.delegation.clear(unit);
                }
            }
        }
        self.live_units = change.counters.live_units;
        self.total_minted = change.counters.total_minted;
        self.next_event_index = change.counters.next_event_index;
        self.ring_capacity = change.counters.ring_capacity;
        self.batch_limit = change.counters.batch_limit;
    }

    // Internals

    fn stage_set_delegate(
        &self,
        txn: &mut Txn<'_>,
        caller: &AccountId,
        unit: UnitId,
        delegatee: &AccountId,
        sequence_point: u64,
    ) -> Result<()> {
        if delegatee.is_null() {
            return Err(Error::InvalidDelegate);
        }
        let holder = self.hooks.ownership.holder_of(unit)?;
        self.authorize(caller, &holder, unit)?;

        let current = txn.override_of(unit);
        match plan_set_delegate(current.as_ref(), &holder, delegatee) {
            DelegationStep::Unchanged => {}
            DelegationStep::SetOverride { previous } => {
                txn.set_override(unit, delegatee.clone());
                txn.move_power(Some(&previous), Some(delegatee), VotePower::ONE, sequence_point)?;
                txn.events.push(DomainEvent::DelegateChanged {
                    unit,
                    previous,
                    next: delegatee.clone(),
                });
            }
            DelegationStep::ClearOverride { previous } => {
                txn.clear_override(unit);
                txn.move_power(Some(&previous), Some(&holder), VotePower::ONE, sequence_point)?;
                txn.events.push(DomainEvent::DelegateChanged {
                    unit,
                    previous,
                    next: holder.clone(),
                });
            }
        }
        Ok(())
    }

    fn stage_clear_delegate(
        &self,
        txn: &mut Txn<'_>,
        caller: &AccountId,
        unit: UnitId,
        sequence_point: u64,
    ) -> Result<()> {
        let holder = self.hooks.ownership.holder_of(unit)?;
        self.authorize(caller, &holder, unit)?;

        if let Some(previous) = txn.override_of(unit) {
            txn.clear_override(unit);
            txn.move_power(Some(&previous), Some(&holder), VotePower::ONE, sequence_point)?;
            txn.events.push(DomainEvent::DelegateChanged {
                unit,
                previous,
                next: holder,
            });
        }
        Ok(())
    }

    fn observe_mint(&self, txn: &mut Txn<'_>, unit: UnitId, holder: &AccountId) {
        let observer = match &self.hooks.observer {
            Some(observer) => observer.clone(),
            None => return,
        };

        let outcome = contain::invoke_contained(self.observer_stipend, |stipend| {
            observer.unit_minted(unit, holder, stipend)
        });
        if !outcome.is_completed() {
            tracing::warn!(%unit, %outcome, "unit observer failed inside containment");
            txn.events.push(DomainEvent::ObserverFailed {
                unit,
                reason: outcome.to_string(),
            });
        }
    }

    fn require_admin(&self, caller: &AccountId) -> Result<()> {
        if self.hooks.admin.is_admin(caller) {
            Ok(())
        } else {
            Err(Error::NotAuthorized(format!("{caller} is not an admin")))
        }
    }

    fn authorize(&self, caller: &AccountId, holder: &AccountId, unit: UnitId) -> Result<()> {
        if caller == holder || self.hooks.ownership.is_approved_operator(holder, caller, unit) {
            Ok(())
        } else {
            Err(Error::NotAuthorized(format!(
                "{caller} is neither holder nor approved operator of unit {unit}"
            )))
        }
    }

    fn check_batch_len(&self, len: usize) -> Result<()> {
        if len > self.batch_limit {
            return Err(Error::BatchTooLarge {
                len,
                limit: self.batch_limit,
            });
        }
        Ok(())
    }
}
