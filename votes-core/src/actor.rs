//! Single-writer execution of ledger calls
//!
//! One tokio task owns the engine and storage handle; every call arrives as
//! a message and is processed to completion before the next one starts.
//! That gives the ledger a serially-ordered sequence of atomic calls
//! without any locking discipline around the rings or the override map.

use crate::engine::{ChangeSet, Engine};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::storage::Storage;
use crate::types::{AccountId, EventRecord, UnitId, VotePower};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Delegate a unit's vote
    SetDelegate {
        /// Calling account
        caller: AccountId,
        /// Unit to delegate
        unit: UnitId,
        /// New delegatee
        delegatee: AccountId,
        /// Events the call journaled (empty for a no-op)
        response: oneshot::Sender<Result<Vec<EventRecord>>>,
    },

    /// Delegate several units atomically
    SetDelegateBatch {
        /// Calling account
        caller: AccountId,
        /// Units to delegate, in order (duplicates allowed)
        units: Vec<UnitId>,
        /// New delegatee for every unit
        delegatee: AccountId,
        /// Events the call journaled
        response: oneshot::Sender<Result<Vec<EventRecord>>>,
    },

    /// Clear a unit's explicit delegation
    ClearDelegate {
        /// Calling account
        caller: AccountId,
        /// Unit to clear
        unit: UnitId,
        /// Events the call journaled
        response: oneshot::Sender<Result<Vec<EventRecord>>>,
    },

    /// Clear several units atomically
    ClearDelegateBatch {
        /// Calling account
        caller: AccountId,
        /// Units to clear, in order
        units: Vec<UnitId>,
        /// Events the call journaled
        response: oneshot::Sender<Result<Vec<EventRecord>>>,
    },

    /// Mint/transfer/burn reported by the asset primitive
    OwnershipChanged {
        /// Affected unit
        unit: UnitId,
        /// Old holder (`None` on mint)
        from: Option<AccountId>,
        /// New holder (`None` on burn)
        to: Option<AccountId>,
        /// Events the call journaled
        response: oneshot::Sender<Result<Vec<EventRecord>>>,
    },

    /// Current voting power of an account
    CurrentPower {
        /// Queried account
        account: AccountId,
        /// The power (infallible)
        response: oneshot::Sender<VotePower>,
    },

    /// Voting power at a past sequence point
    HistoricalPower {
        /// Queried account
        account: AccountId,
        /// Queried sequence point
        sequence_point: u64,
        /// The power, or a refusal
        response: oneshot::Sender<Result<VotePower>>,
    },

    /// Effective delegate of a unit
    EffectiveDelegate {
        /// Queried unit
        unit: UnitId,
        /// The delegate
        response: oneshot::Sender<Result<AccountId>>,
    },

    /// Change the ring capacity (admin, pre-mint only)
    SetRingCapacity {
        /// Calling account
        caller: AccountId,
        /// New capacity
        capacity: u32,
        /// Events the call journaled
        response: oneshot::Sender<Result<Vec<EventRecord>>>,
    },

    /// Change the batch limit (admin)
    SetBatchLimit {
        /// Calling account
        caller: AccountId,
        /// New limit
        limit: usize,
        /// Events the call journaled
        response: oneshot::Sender<Result<Vec<EventRecord>>>,
    },

    /// Current ring capacity
    RingCapacity {
        /// The capacity
        response: oneshot::Sender<u32>,
    },

    /// Current batch limit
    BatchLimit {
        /// The limit
        response: oneshot::Sender<usize>,
    },

    /// Audit the conservation law
    CheckConservation {
        /// Whether total power equals live units
        response: oneshot::Sender<Result<bool>>,
    },

    /// Shutdown actor
    Shutdown {
        /// Acknowledged once the actor has released storage
        response: oneshot::Sender<()>,
    },
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    engine: Engine,
    storage: Arc<Storage>,
    metrics: Arc<Metrics>,
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        engine: Engine,
        storage: Arc<Storage>,
        metrics: Arc<Metrics>,
        mailbox: mpsc::Receiver<LedgerMessage>,
    ) -> Self {
        Self {
            engine,
            storage,
            metrics,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let ack = loop {
            match self.mailbox.recv().await {
                Some(LedgerMessage::Shutdown { response }) => break Some(response),
                Some(msg) => self.handle_message(msg),
                None => break None,
            }
        };

        // Release the database handle before acknowledging so the caller
        // can reopen the same data directory right away.
        let LedgerActor { storage, .. } = self;
        drop(storage);
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// Commit a planned change set: storage first, then memory
    fn commit(&mut self, change: ChangeSet) -> Result<Vec<EventRecord>> {
        if change.is_noop() {
            return Ok(Vec::new());
        }
        self.storage.commit(&change)?;
        self.metrics.record_commit(&change);
        let events = change.events.clone();
        self.engine.apply(change);
        Ok(events)
    }

    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::SetDelegate {
                caller,
                unit,
                delegatee,
                response,
            } => {
                let result = self
                    .engine
                    .set_delegate(&caller, unit, &delegatee)
                    .and_then(|change| self.commit(change));
                let _ = response.send(result);
            }

            LedgerMessage::SetDelegateBatch {
                caller,
                units,
                delegatee,
                response,
            } => {
                self.metrics.record_batch(units.len());
                let result = self
                    .engine
                    .set_delegate_batch(&caller, &units, &delegatee)
                    .and_then(|change| self.commit(change));
                let _ = response.send(result);
            }

            LedgerMessage::ClearDelegate {
                caller,
                unit,
                response,
            } => {
                let result = self
                    .engine
                    .clear_delegate(&caller, unit)
                    .and_then(|change| self.commit(change));
                let _ = response.send(result);
            }

            LedgerMessage::ClearDelegateBatch {
                caller,
                units,
                response,
            } => {
                self.metrics.record_batch(units.len());
                let result = self
                    .engine
                    .clear_delegate_batch(&caller, &units)
                    .and_then(|change| self.commit(change));
                let _ = response.send(result);
            }

            LedgerMessage::OwnershipChanged {
                unit,
                from,
                to,
                response,
            } => {
                let result = self
                    .engine
                    .ownership_changed(unit, from.as_ref(), to.as_ref())
                    .and_then(|change| self.commit(change));
                let _ = response.send(result);
            }

            LedgerMessage::CurrentPower { account, response } => {
                let _ = response.send(self.engine.current_power(&account));
            }

            LedgerMessage::HistoricalPower {
                account,
                sequence_point,
                response,
            } => {
                let _ = response.send(self.engine.historical_power(&account, sequence_point));
            }

            LedgerMessage::EffectiveDelegate { unit, response } => {
                let _ = response.send(self.engine.effective_delegate(unit));
            }

            LedgerMessage::SetRingCapacity {
                caller,
                capacity,
                response,
            } => {
                let result = self
                    .engine
                    .set_ring_capacity(&caller, capacity)
                    .and_then(|change| self.commit(change));
                let _ = response.send(result);
            }

            LedgerMessage::SetBatchLimit {
                caller,
                limit,
                response,
            } => {
                let result = self
                    .engine
                    .set_batch_limit(&caller, limit)
                    .and_then(|change| self.commit(change));
                let _ = response.send(result);
            }

            LedgerMessage::RingCapacity { response } => {
                let _ = response.send(self.engine.ring_capacity());
            }

            LedgerMessage::BatchLimit { response } => {
                let _ = response.send(self.engine.batch_limit());
            }

            LedgerMessage::CheckConservation { response } => {
                let _ = response.send(self.engine.check_conservation());
            }

            LedgerMessage::Shutdown { .. } => {
                // Handled in the main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| Error::Concurrency("actor mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| Error::Concurrency("response channel closed".to_string()))
    }

    /// Delegate a unit's vote
    pub async fn set_delegate(
        &self,
        caller: AccountId,
        unit: UnitId,
        delegatee: AccountId,
    ) -> Result<Vec<EventRecord>> {
        self.call(|response| LedgerMessage::SetDelegate {
            caller,
            unit,
            delegatee,
            response,
        })
        .await?
    }

    /// Delegate several units atomically
    pub async fn set_delegate_batch(
        &self,
        caller: AccountId,
        units: Vec<UnitId>,
        delegatee: AccountId,
    ) -> Result<Vec<EventRecord>> {
        self.call(|response| LedgerMessage::SetDelegateBatch {
            caller,
            units,
            delegatee,
            response,
        })
        .await?
    }

    /// Clear a unit's explicit delegation
    pub async fn clear_delegate(
        &self,
        caller: AccountId,
        unit: UnitId,
    ) -> Result<Vec<EventRecord>> {
        self.call(|response| LedgerMessage::ClearDelegate {
            caller,
            unit,
            response,
        })
        .await?
    }

    /// Clear several units atomically
    pub async fn clear_delegate_batch(
        &self,
        caller: AccountId,
        units: Vec<UnitId>,
    ) -> Result<Vec<EventRecord>> {
        self.call(|response| LedgerMessage::ClearDelegateBatch {
            caller,
            units,
            response,
        })
        .await?
    }

    /// Report a mint/transfer/burn
    pub async fn ownership_changed(
        &self,
        unit: UnitId,
        from: Option<AccountId>,
        to: Option<AccountId>,
    ) -> Result<Vec<EventRecord>> {
        self.call(|response| LedgerMessage::OwnershipChanged {
            unit,
            from,
            to,
            response,
        })
        .await?
    }

    /// Current voting power of an account
    pub async fn current_power(&self, account: AccountId) -> Result<VotePower> {
        self.call(|response| LedgerMessage::CurrentPower { account, response })
            .await
    }

    /// Voting power at a past sequence point
    pub async fn historical_power(
        &self,
        account: AccountId,
        sequence_point: u64,
    ) -> Result<VotePower> {
        self.call(|response| LedgerMessage::HistoricalPower {
            account,
            sequence_point,
            response,
        })
        .await?
    }

    /// Effective delegate of a unit
    pub async fn effective_delegate(&self, unit: UnitId) -> Result<AccountId> {
        self.call(|response| LedgerMessage::EffectiveDelegate { unit, response })
            .await?
    }

    /// Change the ring capacity (admin, pre-mint only)
    pub async fn set_ring_capacity(
        &self,
        caller: AccountId,
        capacity: u32,
    ) -> Result<Vec<EventRecord>> {
        self.call(|response| LedgerMessage::SetRingCapacity {
            caller,
            capacity,
            response,
        })
        .await?
    }

    /// Change the batch limit (admin)
    pub async fn set_batch_limit(
        &self,
        caller: AccountId,
        limit: usize,
    ) -> Result<Vec<EventRecord>> {
        self.call(|response| LedgerMessage::SetBatchLimit {
            caller,
            limit,
            response,
        })
        .await?
    }

    /// Current ring capacity
    pub async fn ring_capacity(&self) -> Result<u32> {
        self.call(|response| LedgerMessage::RingCapacity { response })
            .await
    }

    /// Current batch limit
    pub async fn batch_limit(&self) -> Result<usize> {
        self.call(|response| LedgerMessage::BatchLimit { response })
            .await
    }

    /// Audit the conservation law
    pub async fn check_conservation(&self) -> Result<bool> {
        self.call(|response| LedgerMessage::CheckConservation { response })
            .await?
    }

    /// Shutdown actor, waiting until storage has been released
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|response| LedgerMessage::Shutdown { response })
            .await
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    engine: Engine,
    storage: Arc<Storage>,
    metrics: Arc<Metrics>,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1024); // Bounded channel for backpressure
    let actor = LedgerActor::new(engine, storage, metrics, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
