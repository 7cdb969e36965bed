//! Contained invocation of untrusted callbacks
//!
//! The mint path may hand control to an external observer (a renderer-style
//! collaborator the core does not trust). The invocation runs under a fuel
//! stipend and a panic boundary, and every failure mode (an error return,
//! an exhausted stipend, a panic) is converted into a value the caller can
//! log. Nothing the callee does can unwind into the core's control flow or
//! block a mint.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Fuel budget handed to an untrusted callback
///
/// The callback pays for its work by calling [`Stipend::consume`]; once the
/// budget is spent every further charge fails.
#[derive(Debug)]
pub struct Stipend {
    budget: u64,
    used: u64,
}

impl Stipend {
    /// Create a stipend with the given fuel budget
    pub fn new(budget: u64) -> Self {
        Self { budget, used: 0 }
    }

    /// Fuel still available
    pub fn remaining(&self) -> u64 {
        self.budget - self.used
    }

    /// Charge `units` of fuel; fails once the budget is exhausted
    pub fn consume(&mut self, units: u64) -> std::result::Result<(), StipendExhausted> {
        if units > self.remaining() {
            self.used = self.budget;
            return Err(StipendExhausted);
        }
        self.used += units;
        Ok(())
    }
}

/// The stipend ran out mid-callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StipendExhausted;

/// Failure an observer callback can report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// The fuel stipend was exhausted
    Exhausted,
    /// The callback failed with its own message
    Failed(String),
}

impl From<StipendExhausted> for ObserverError {
    fn from(_: StipendExhausted) -> Self {
        ObserverError::Exhausted
    }
}

/// What happened inside the containment boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainedOutcome {
    /// The callback returned without error
    Completed,
    /// The callback reported a failure
    Failed(String),
    /// The callback exhausted its fuel stipend
    Exhausted,
    /// The callback panicked; the panic was caught at the boundary
    Panicked(String),
}

impl ContainedOutcome {
    /// Whether the callback ran to completion
    pub fn is_completed(&self) -> bool {
        matches!(self, ContainedOutcome::Completed)
    }
}

impl fmt::Display for ContainedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainedOutcome::Completed => write!(f, "completed"),
            ContainedOutcome::Failed(msg) => write!(f, "failed: {msg}"),
            ContainedOutcome::Exhausted => write!(f, "stipend exhausted"),
            ContainedOutcome::Panicked(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// Run an untrusted callback under a fuel stipend and a panic boundary
///
/// The callback's only channel back to the core is the returned outcome;
/// it can neither unwind nor consume unbounded resources through the
/// stipend it is given.
pub fn invoke_contained<F>(budget: u64, callback: F) -> ContainedOutcome
where
    F: FnOnce(&mut Stipend) -> std::result::Result<(), ObserverError>,
{
    let mut stipend = Stipend::new(budget);
    let result = catch_unwind(AssertUnwindSafe(|| callback(&mut stipend)));

    match result {
        Ok(Ok(())) => ContainedOutcome::Completed,
        Ok(Err(ObserverError::Exhausted)) => ContainedOutcome::Exhausted,
        Ok(Err(ObserverError::Failed(msg))) => ContainedOutcome::Failed(msg),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "opaque panic payload".to_string());
            ContainedOutcome::Panicked(msg)
        }
    }
}
