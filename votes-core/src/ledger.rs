//! Main ledger orchestration layer
//!
//! Ties together the engine, storage, actor, and metrics into a high-level
//! API for delegation and vote-weight accounting.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use votes_core::{AdminList, Config, ExternalHooks, InMemoryOwnership, ManualClock, VoteLedger};
//!
//! #[tokio::main]
//! async fn main() -> votes_core::Result<()> {
//!     let hooks = ExternalHooks {
//!         ownership: Arc::new(InMemoryOwnership::new()),
//!         admin: Arc::new(AdminList::new()),
//!         clock: Arc::new(ManualClock::starting_at(1)),
//!         observer: None,
//!     };
//!     let ledger = VoteLedger::open(Config::default(), hooks).await?;
//!
//!     // let events = ledger.set_delegate(caller, unit, delegatee).await?;
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::actor::{spawn_ledger_actor, LedgerHandle};
use crate::engine::Engine;
use crate::error::Result;
use crate::hooks::ExternalHooks;
use crate::metrics::Metrics;
use crate::storage::{Storage, StorageStats};
use crate::types::{AccountId, EventRecord, UnitId, VotePower};
use crate::Config;
use std::sync::Arc;

/// Main vote ledger interface
pub struct VoteLedger {
    /// Actor handle for serialized calls
    handle: LedgerHandle,

    /// Direct storage access (journal and stats reads)
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Arc<Metrics>,
}

impl VoteLedger {
    /// Open the ledger, recovering any persisted state
    pub async fn open(config: Config, hooks: ExternalHooks) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(Storage::open(&config)?);
        let engine = match storage.load()? {
            Some(snapshot) => Engine::restore(&config, snapshot, hooks),
            None => Engine::new(&config, hooks),
        };

        let metrics = Arc::new(Metrics::new()?);
        let handle = spawn_ledger_actor(engine, storage.clone(), metrics.clone());

        Ok(Self {
            handle,
            storage,
            metrics,
        })
    }

    /// Delegate a unit's vote to `delegatee`
    ///
    /// Returns the journaled events; an idempotent repeat returns none.
    pub async fn set_delegate(
        &self,
        caller: AccountId,
        unit: UnitId,
        delegatee: AccountId,
    ) -> Result<Vec<EventRecord>> {
        self.handle.set_delegate(caller, unit, delegatee).await
    }

    /// Delegate several units in one atomic call
    pub async fn set_delegate_batch(
        &self,
        caller: AccountId,
        units: Vec<UnitId>,
        delegatee: AccountId,
    ) -> Result<Vec<EventRecord>> {
        self.handle
            .set_delegate_batch(caller, units, delegatee)
            .await
    }

    /// Clear a unit's explicit delegation, if any
    pub async fn clear_delegate(
        &self,
        caller: AccountId,
        unit: UnitId,
    ) -> Result<Vec<EventRecord>> {
        self.handle.clear_delegate(caller, unit).await
    }

    /// Clear several units in one atomic call
    pub async fn clear_delegate_batch(
        &self,
        caller: AccountId,
        units: Vec<UnitId>,
    ) -> Result<Vec<EventRecord>> {
        self.handle.clear_delegate_batch(caller, units).await
    }

    /// Report a mint/transfer/burn from the asset primitive
    ///
    /// `from` is `None` on mint, `to` is `None` on burn. This is the hook
    /// the asset collaborator drives; it is not meant for end callers.
    pub async fn ownership_changed(
        &self,
        unit: UnitId,
        from: Option<AccountId>,
        to: Option<AccountId>,
    ) -> Result<Vec<EventRecord>> {
        self.handle.ownership_changed(unit, from, to).await
    }

    /// Current voting power of an account
    pub async fn current_power(&self, account: AccountId) -> Result<VotePower> {
        self.handle.current_power(account).await
    }

    /// Voting power of an account at a past sequence point
    ///
    /// Fails with `FutureQuery` for the present or future, and with
    /// `HistoryPruned` when the queried point has been evicted. A consumer
    /// must treat both as "snapshot unavailable", never as zero power.
    pub async fn historical_power(
        &self,
        account: AccountId,
        sequence_point: u64,
    ) -> Result<VotePower> {
        self.handle.historical_power(account, sequence_point).await
    }

    /// Effective delegate of a unit (override if set, else holder)
    pub async fn effective_delegate(&self, unit: UnitId) -> Result<AccountId> {
        self.handle.effective_delegate(unit).await
    }

    /// Change the per-account checkpoint capacity (admin, pre-mint only)
    pub async fn set_ring_capacity(
        &self,
        caller: AccountId,
        capacity: u32,
    ) -> Result<Vec<EventRecord>> {
        self.handle.set_ring_capacity(caller, capacity).await
    }

    /// Change the batch length limit (admin, any time)
    pub async fn set_batch_limit(
        &self,
        caller: AccountId,
        limit: usize,
    ) -> Result<Vec<EventRecord>> {
        self.handle.set_batch_limit(caller, limit).await
    }

    /// Per-account checkpoint capacity currently in force
    pub async fn ring_capacity(&self) -> Result<u32> {
        self.handle.ring_capacity().await
    }

    /// Batch length limit currently in force
    pub async fn batch_limit(&self) -> Result<usize> {
        self.handle.batch_limit().await
    }

    /// Audit the conservation law: total power equals live units
    pub async fn check_conservation(&self) -> Result<bool> {
        self.handle.check_conservation().await
    }

    /// Journal events at or after `index`, in order
    pub fn events_since(&self, index: u64) -> Result<Vec<EventRecord>> {
        self.storage.events_since(index)
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.stats()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}
