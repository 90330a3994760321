//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring a node.
//!
//! # Metrics
//!
//! - `chain_transactions_total{outcome}` - Transactions accepted/rejected
//! - `chain_blocks_total{source, outcome}` - Mined and peer blocks by outcome
//! - `chain_replacements_total` - Chains replaced by conflict resolution
//! - `chain_height` - Current chain length (genesis included)
//! - `chain_open_transactions` - Current open pool size
//! - `chain_mining_duration_seconds` - Proof-of-work search latency
//! - `chain_peer_failures_total` - Peer calls that failed or timed out

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions by outcome
    pub transactions_total: IntCounterVec,

    /// Blocks by source and outcome
    pub blocks_total: IntCounterVec,

    /// Chain replacements
    pub chain_replacements: IntCounter,

    /// Chain height
    pub chain_height: IntGauge,

    /// Open pool size
    pub open_transactions: IntGauge,

    /// Mining duration histogram
    pub mining_duration: Histogram,

    /// Failed peer calls
    pub peer_failures: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("chain_height", &self.chain_height.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_total = IntCounterVec::new(
            Opts::new("chain_transactions_total", "Transactions by admission outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(transactions_total.clone()))?;

        let blocks_total = IntCounterVec::new(
            Opts::new("chain_blocks_total", "Blocks by source and outcome"),
            &["source", "outcome"],
        )?;
        registry.register(Box::new(blocks_total.clone()))?;

        let chain_replacements = IntCounter::new(
            "chain_replacements_total",
            "Chains replaced by conflict resolution",
        )?;
        registry.register(Box::new(chain_replacements.clone()))?;

        let chain_height = IntGauge::new("chain_height", "Current chain length")?;
        registry.register(Box::new(chain_height.clone()))?;

        let open_transactions =
            IntGauge::new("chain_open_transactions", "Current open pool size")?;
        registry.register(Box::new(open_transactions.clone()))?;

        let mining_duration = Histogram::with_opts(
            HistogramOpts::new(
                "chain_mining_duration_seconds",
                "Histogram of proof-of-work search latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(mining_duration.clone()))?;

        let peer_failures =
            IntCounter::new("chain_peer_failures_total", "Peer calls that failed")?;
        registry.register(Box::new(peer_failures.clone()))?;

        Ok(Self {
            transactions_total,
            blocks_total,
            chain_replacements,
            chain_height,
            open_transactions,
            mining_duration,
            peer_failures,
            registry,
        })
    }

    /// Record a transaction admission result
    pub fn record_transaction(&self, accepted: bool) {
        let outcome = if accepted { "accepted" } else { "rejected" };
        self.transactions_total.with_label_values(&[outcome]).inc();
    }

    /// Record a block outcome (`source` is `mined` or `peer`)
    pub fn record_block(&self, source: &str, outcome: &str) {
        self.blocks_total.with_label_values(&[source, outcome]).inc();
    }

    /// Update chain gauges
    pub fn observe_state(&self, height: usize, open_transactions: usize) {
        self.chain_height.set(height as i64);
        self.open_transactions.set(open_transactions as i64);
    }

    /// Render metrics in the Prometheus text format
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
