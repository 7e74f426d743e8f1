//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `donation_ledger_donations_total` - Committed donations
//! - `donation_ledger_withdrawals_total` - Committed withdrawals
//! - `donation_ledger_events_total` - Committed events of any kind
//! - `donation_ledger_rejected_total{kind}` - Rejected operations by error kind
//! - `donation_ledger_command_duration_seconds` - Command latency (prepare + persist + apply)

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Each instance owns its registry, so several ledgers can live in one process.
#[derive(Clone)]
pub struct Metrics {
    /// Committed donations
    pub donations_total: IntCounter,

    /// Committed withdrawals
    pub withdrawals_total: IntCounter,

    /// Committed events
    pub events_total: IntCounter,

    /// Rejected operations, labelled by error kind
    pub rejected_total: IntCounterVec,

    /// Command duration histogram
    pub command_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("events_total", &self.events_total.get())
            .field("donations_total", &self.donations_total.get())
            .field("withdrawals_total", &self.withdrawals_total.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let donations_total = IntCounter::new(
            "donation_ledger_donations_total",
            "Total number of committed donations",
        )?;
        registry.register(Box::new(donations_total.clone()))?;

        let withdrawals_total = IntCounter::new(
            "donation_ledger_withdrawals_total",
            "Total number of committed withdrawals",
        )?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let events_total = IntCounter::new(
            "donation_ledger_events_total",
            "Total number of committed events",
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new(
                "donation_ledger_rejected_total",
                "Operations rejected, by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let command_duration = Histogram::with_opts(
            HistogramOpts::new(
                "donation_ledger_command_duration_seconds",
                "Histogram of command latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        Ok(Self {
            donations_total,
            withdrawals_total,
            events_total,
            rejected_total,
            command_duration,
            registry,
        })
    }

    /// Record a committed event
    pub fn record_commit(&self, event_name: &str) {
        self.events_total.inc();
        match event_name {
            "Donated" => self.donations_total.inc(),
            "Withdrawn" => self.withdrawals_total.inc(),
            _ => {}
        }
    }

    /// Record a rejected operation
    pub fn record_rejection(&self, kind: &str) {
        self.rejected_total.with_label_values(&[kind]).inc();
    }

    /// Record command duration
    pub fn record_command_duration(&self, duration_seconds: f64) {
        self.command_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
