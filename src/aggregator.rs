//! Batches durable-side stock deltas so confirmed purchases, cancellations and
//! admin corrections do not each hit the variant table.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::CacheClient;
use crate::clients::VariantClient;
use crate::error::OrderError;

/// `variant id -> signed delta` awaiting a flush. One mutex guards both
/// mutation and the flush swap, so a delta lands in exactly one snapshot.
#[derive(Default)]
pub struct StockAggregator {
    pending: Mutex<HashMap<i64, i64>>,
}

impl StockAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stock(&self, variant_id: i64, delta: i64) {
        if delta == 0 {
            return;
        }
        let mut pending = self.pending.lock();
        let total = pending.entry(variant_id).or_insert(0);
        *total += delta;
        if *total == 0 {
            pending.remove(&variant_id);
        }
    }

    /// Swaps the accumulated map out and returns it, leaving the aggregator empty.
    pub fn flush(&self) -> HashMap<i64, i64> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Puts a snapshot back, merged with whatever arrived since it was taken.
    pub fn restore(&self, snapshot: HashMap<i64, i64>) {
        for (variant_id, delta) in snapshot {
            self.add_stock(variant_id, delta);
        }
    }

    pub fn pending(&self) -> HashMap<i64, i64> {
        self.pending.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// Periodic routine moving aggregator snapshots into the variant table.
pub struct AggregatorFlusher {
    aggregator: Arc<StockAggregator>,
    variants: VariantClient,
    cache: CacheClient,
    interval: Duration,
}

impl AggregatorFlusher {
    pub fn new(aggregator: Arc<StockAggregator>, variants: VariantClient, cache: CacheClient, interval: Duration) -> Self {
        Self { aggregator, variants, cache, interval }
    }

    /// Applies one snapshot. On failure the snapshot goes back into the
    /// aggregator for the next tick.
    #[instrument(name = "aggregator_flush", skip(self))]
    pub async fn flush_once(&self) -> Result<usize, OrderError> {
        let snapshot = self.aggregator.flush();
        if snapshot.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.variants.apply_deltas(&snapshot).await {
            warn!(error = %e, variants = snapshot.len(), "Flush failed, deltas kept for next tick");
            self.aggregator.restore(snapshot);
            return Err(e);
        }

        let touched: Vec<i64> = snapshot.into_keys().collect();
        let count = touched.len();
        if let Err(e) = self.cache.invalidate(touched).await {
            warn!(error = %e, "Cache invalidation after flush failed");
        }
        info!(variants = count, "Aggregated stock flushed");
        Ok(count)
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Aggregator flusher started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush_once().await {
                        error!(error = %e, "Aggregator flush aborted");
                    }
                }
                _ = shutdown.cancelled() => {
                    debug!("Aggregator flusher draining before shutdown");
                    if let Err(e) = self.flush_once().await {
                        error!(error = %e, "Final aggregator flush failed");
                    }
                    info!("Aggregator flusher stopped");
                    return;
                }
            }
        }
    }
}
