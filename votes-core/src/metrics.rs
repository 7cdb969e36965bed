//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `votes_power_moves_total` - Power moves committed
//! - `votes_delegate_changes_total` - Explicit delegation changes committed
//! - `votes_checkpoints_appended_total` - Checkpoints appended to rings
//! - `votes_checkpoints_compressed_total` - Same-sequence-point overwrites
//! - `votes_checkpoints_evicted_total` - Oldest checkpoints discarded
//! - `votes_observer_failures_total` - Contained observer failures
//! - `votes_batch_size` - Histogram of batch call sizes

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Power moves committed
    pub power_moves_total: IntCounter,

    /// Explicit delegation changes committed
    pub delegate_changes_total: IntCounter,

    /// Checkpoints appended
    pub checkpoints_appended_total: IntCounter,

    /// Same-sequence-point compressions
    pub checkpoints_compressed_total: IntCounter,

    /// Checkpoints evicted by full rings
    pub checkpoints_evicted_total: IntCounter,

    /// Contained observer failures
    pub observer_failures_total: IntCounter,

    /// Batch call size histogram
    pub batch_size: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let power_moves_total = IntCounter::with_opts(Opts::new(
            "votes_power_moves_total",
            "Power moves committed",
        ))?;
        registry.register(Box::new(power_moves_total.clone()))?;

        let delegate_changes_total = IntCounter::with_opts(Opts::new(
            "votes_delegate_changes_total",
            "Explicit delegation changes committed",
        ))?;
        registry.register(Box::new(delegate_changes_total.clone()))?;

        let checkpoints_appended_total = IntCounter::with_opts(Opts::new(
            "votes_checkpoints_appended_total",
            "Checkpoints appended to rings",
        ))?;
        registry.register(Box::new(checkpoints_appended_total.clone()))?;

        let checkpoints_compressed_total = IntCounter::with_opts(Opts::new(
            "votes_checkpoints_compressed_total",
            "Same-sequence-point checkpoint overwrites",
        ))?;
        registry.register(Box::new(checkpoints_compressed_total.clone()))?;

        let checkpoints_evicted_total = IntCounter::with_opts(Opts::new(
            "votes_checkpoints_evicted_total",
            "Oldest checkpoints discarded by full rings",
        ))?;
        registry.register(Box::new(checkpoints_evicted_total.clone()))?;

        let observer_failures_total = IntCounter::with_opts(Opts::new(
            "votes_observer_failures_total",
            "Contained observer failures",
        ))?;
        registry.register(Box::new(observer_failures_total.clone()))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("votes_batch_size", "Batch call sizes").buckets(vec![
                1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0,
            ]),
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        Ok(Self {
            power_moves_total,
            delegate_changes_total,
            checkpoints_appended_total,
            checkpoints_compressed_total,
            checkpoints_evicted_total,
            observer_failures_total,
            batch_size,
            registry,
        })
    }

    /// Record one committed change set
    pub fn record_commit(&self, change: &crate::engine::ChangeSet) {
        for record in &change.events {
            match &record.event {
                crate::types::DomainEvent::PowerMoved { .. } => self.power_moves_total.inc(),
                crate::types::DomainEvent::DelegateChanged { .. } => {
                    self.delegate_changes_total.inc()
                }
                crate::types::DomainEvent::ObserverFailed { .. } => {
                    self.observer_failures_total.inc()
                }
                _ => {}
            }
        }
        self.checkpoints_appended_total
            .inc_by(change.ring_writes.appended);
        self.checkpoints_compressed_total
            .inc_by(change.ring_writes.compressed);
        self.checkpoints_evicted_total
            .inc_by(change.ring_writes.evicted);
    }

    /// Record a batch call size
    pub fn record_batch(&self, len: usize) {
        self.batch_size.observe(len as f64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
