//! VoteRail Votes Core
//!
//! Per-unit vote delegation with a checkpointed voting-power ledger.
//!
//! # Architecture
//!
//! - **Checkpoint rings**: bounded per-account history with O(log n)
//!   historical queries; full rings evict their oldest entry so an account
//!   can never be write-locked
//! - **Delegation map**: explicit per-unit overrides over implicit
//!   holder delegation
//! - **Single writer**: one actor task processes each call to completion
//! - **Atomic calls**: plan against a staging overlay, commit one
//!   `WriteBatch`, install in memory; both legs of a move or neither
//!
//! # Invariants
//!
//! - Conservation: Σ(current power) == live units, at every quiescent point
//! - Liveness: a full history never blocks an account's vote weight
//! - Honest history: pruned lookbacks are refused, not answered with zero
//! - Sequence points order all checkpoints; wall clocks are never consulted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod checkpoint;
pub mod config;
pub mod contain;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use hooks::{
    AdminGate, AdminList, ExternalHooks, InMemoryOwnership, ManualClock, OwnershipOracle,
    SequenceClock, UnitObserver,
};
pub use ledger::VoteLedger;
pub use types::{AccountId, Checkpoint, DomainEvent, EventRecord, UnitId, VotePower};
