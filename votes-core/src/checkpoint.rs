//! Checkpointed voting-power history
//!
//! Each account owns a fixed-capacity ring of (sequence point, power)
//! checkpoints. Appends past capacity overwrite the oldest entry, so storage
//! per account is bounded and an account can always keep voting no matter
//! how many checkpoints an adversary forces into its history. The price is
//! bounded lookback: queries older than the retained window are refused,
//! not answered with a guess.

use crate::error::{Error, Result};
use crate::types::{Checkpoint, VotePower};
use serde::{Deserialize, Serialize};

/// How a call to [`CheckpointRing::record`] landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new checkpoint was appended
    Appended,
    /// The last checkpoint had the same sequence point and was overwritten
    Compressed,
    /// A new checkpoint was appended and the oldest one was discarded
    Evicted,
}

/// Fixed-capacity checkpoint history for one account
///
/// Logical checkpoint `i` (0-indexed, oldest first) lives at physical slot
/// `(start + i) % capacity`. `start` only moves once the ring has filled and
/// eviction begins; `evicted` counts every discarded checkpoint so the ring
/// can tell "no history yet" apart from "history pruned".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRing {
    slots: Vec<Checkpoint>,
    capacity: u32,
    start: u32,
    count: u32,
    evicted: u64,
}

impl CheckpointRing {
    /// Create an empty ring with the given capacity (must be at least 1)
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: Vec::new(),
            capacity: capacity.max(1),
            start: 0,
            count: 0,
            evicted: 0,
        }
    }

    /// Maximum number of retained checkpoints
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of retained checkpoints
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Whether no checkpoint has ever been written
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total checkpoints discarded by eviction over the ring's lifetime
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    fn physical(&self, logical: u32) -> usize {
        ((self.start + logical) % self.capacity) as usize
    }

    /// Checkpoint at logical position `i` (0 = oldest retained)
    fn get(&self, logical: u32) -> Checkpoint {
        self.slots[self.physical(logical)]
    }

    /// Oldest retained checkpoint
    pub fn oldest(&self) -> Option<Checkpoint> {
        (self.count > 0).then(|| self.get(0))
    }

    /// Most recent checkpoint
    pub fn latest(&self) -> Option<Checkpoint> {
        (self.count > 0).then(|| self.get(self.count - 1))
    }

    /// Power in effect right now (zero for an empty ring)
    pub fn current_power(&self) -> VotePower {
        self.latest().map(|c| c.power).unwrap_or(VotePower::ZERO)
    }

    /// Write the power in effect from `sequence_point` onward
    ///
    /// A write at the same sequence point as the latest checkpoint
    /// overwrites it in place: intermediate values inside one atomic call
    /// are not observable history. A write below the latest sequence point
    /// breaks the clock contract and is rejected.
    pub fn record(&mut self, sequence_point: u64, power: VotePower) -> Result<RecordOutcome> {
        if let Some(last) = self.latest() {
            if last.sequence_point == sequence_point {
                let idx = self.physical(self.count - 1);
                self.slots[idx].power = power;
                return Ok(RecordOutcome::Compressed);
            }
            if last.sequence_point > sequence_point {
                return Err(Error::InvariantViolation(format!(
                    "sequence point {} precedes the latest checkpoint at {}",
                    sequence_point, last.sequence_point
                )));
            }
        }

        let checkpoint = Checkpoint {
            sequence_point,
            power,
        };

        if self.count < self.capacity {
            let idx = self.physical(self.count);
            if idx == self.slots.len() {
                self.slots.push(checkpoint);
            } else {
                self.slots[idx] = checkpoint;
            }
            self.count += 1;
            Ok(RecordOutcome::Appended)
        } else {
            // Ring full: the new logical tail lands exactly where the
            // current logical head sits.
            self.slots[self.start as usize] = checkpoint;
            self.start = (self.start + 1) % self.capacity;
            self.evicted += 1;
            Ok(RecordOutcome::Evicted)
        }
    }

    /// Power in effect at `sequence_point` (floor semantics)
    ///
    /// Returns zero for an empty ring, and for queries preceding all
    /// retained history when nothing has ever been evicted. Once eviction
    /// has occurred, a query older than the oldest retained checkpoint is
    /// ambiguous and fails with [`Error::HistoryPruned`].
    pub fn power_at(&self, sequence_point: u64) -> Result<VotePower> {
        let oldest = match self.oldest() {
            Some(c) => c,
            None => return Ok(VotePower::ZERO),
        };

        if sequence_point < oldest.sequence_point {
            if self.evicted > 0 {
                return Err(Error::HistoryPruned {
                    requested: sequence_point,
                    oldest: oldest.sequence_point,
                });
            }
            return Ok(VotePower::ZERO);
        }

        // Find the first logical index with a sequence point strictly
        // greater than the query; the answer sits just before it.
        let mut lo = 0u32;
        let mut hi = self.count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.get(mid).sequence_point <= sequence_point {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(self.get(lo - 1).power)
    }
}
