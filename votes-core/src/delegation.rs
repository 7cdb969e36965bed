//! Per-unit delegation overrides
//!
//! A unit with no entry is implicitly delegated to its holder; an entry is
//! an explicit override. Overrides are cleared on transfer and burn, so the
//! map only ever describes the current holder's standing choice.

use crate::types::{AccountId, UnitId};
use std::collections::HashMap;

/// Explicit delegate overrides, keyed by unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationMap {
    overrides: HashMap<UnitId, AccountId>,
}

impl DelegationMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit override for a unit, if any
    pub fn get(&self, unit: UnitId) -> Option<&AccountId> {
        self.overrides.get(&unit)
    }

    /// Effective delegate: the override if set, else the holder
    pub fn resolve(&self, unit: UnitId, holder: &AccountId) -> AccountId {
        self.overrides
            .get(&unit)
            .cloned()
            .unwrap_or_else(|| holder.clone())
    }

    /// Install or replace an override
    pub fn set(&mut self, unit: UnitId, delegatee: AccountId) {
        self.overrides.insert(unit, delegatee);
    }

    /// Remove an override, returning the previous delegatee
    pub fn clear(&mut self, unit: UnitId) -> Option<AccountId> {
        self.overrides.remove(&unit)
    }

    /// Number of explicit overrides
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Whether no override is set
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// Iterate all overrides (persistence walk)
    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &AccountId)> {
        self.overrides.iter().map(|(unit, acct)| (*unit, acct))
    }
}

/// The state change an explicit delegation call implies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationStep {
    /// Effective delegate is already the requested one; nothing to do
    Unchanged,

    /// Install the override and move one vote from the previous effective
    /// delegate to the new delegatee
    SetOverride {
        /// Effective delegate before the call (override or holder)
        previous: AccountId,
    },

    /// Remove the override and move one vote back to the holder
    ClearOverride {
        /// The override being removed
        previous: AccountId,
    },
}

/// Decide what `set_delegate` does, given the unit's current state
///
/// Delegating to the holder collapses any override back to the implicit
/// state instead of storing a redundant entry, so `override == holder` is
/// never representable.
pub fn plan_set_delegate(
    current_override: Option<&AccountId>,
    holder: &AccountId,
    delegatee: &AccountId,
) -> DelegationStep {
    if delegatee == holder {
        return match current_override {
            Some(previous) => DelegationStep::ClearOverride {
                previous: previous.clone(),
            },
            None => DelegationStep::Unchanged,
        };
    }

    let previous = current_override.unwrap_or(holder);
    if previous == delegatee {
        DelegationStep::Unchanged
    } else {
        DelegationStep::SetOverride {
            previous: previous.clone(),
        }
    }
}
