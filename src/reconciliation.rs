//! Periodic job folding decided drafts into the durable store.
//!
//! Every step re-selects by the same filter (drafts with a decided
//! promotion), so an aborted run is simply repeated by the next tick. Durable
//! quantities are settled per `(variant, draft)` pair and each variant row
//! remembers the drafts it already absorbed, so a run that dies after step 3
//! does not subtract the same units again.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::CacheClient;
use crate::clients::{DraftClient, VariantClient};
use crate::domain::{ItemOwner, Promotion};
use crate::error::OrderError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationReport {
    pub promoted_drafts: usize,
    pub rejected_drafts: usize,
    /// Net change applied to durable quantities, per variant.
    pub applied_deltas: HashMap<i64, i64>,
    pub invalidated: usize,
}

impl ReconciliationReport {
    pub fn is_empty(&self) -> bool {
        self.promoted_drafts == 0 && self.rejected_drafts == 0
    }
}

pub struct ReconciliationJob {
    drafts: DraftClient,
    variants: VariantClient,
    cache: CacheClient,
    interval: Duration,
}

impl ReconciliationJob {
    pub fn new(drafts: DraftClient, variants: VariantClient, cache: CacheClient, interval: Duration) -> Self {
        Self { drafts, variants, cache, interval }
    }

    #[instrument(name = "reconciliation", skip(self))]
    pub async fn run_once(&self) -> Result<ReconciliationReport, OrderError> {
        // Step 1: every draft with a known outcome
        let decided = self.drafts.decided_drafts().await?;
        if decided.is_empty() {
            debug!("Nothing to reconcile");
            return Ok(ReconciliationReport::default());
        }

        let mut promoted = HashSet::new();
        let mut rejected = HashSet::new();
        for draft in &decided {
            match draft.promotion {
                Promotion::Promoted(_) => promoted.insert(draft.id),
                Promotion::Rejected => rejected.insert(draft.id),
                Promotion::Undecided => false,
            };
        }

        // Step 2: units sold per variant and draft by the promoted drafts
        let mut sold: HashMap<(i64, i64), i64> = HashMap::new();
        for item in self.drafts.items_of_drafts(promoted.clone()).await? {
            if let ItemOwner::Draft(draft_id) = item.owner {
                *sold.entry((item.product_variant_id, draft_id)).or_insert(0) += item.quantity;
            }
        }
        let mut deltas: HashMap<i64, i64> = HashMap::new();
        for ((variant_id, _), quantity) in &sold {
            *deltas.entry(*variant_id).or_insert(0) -= quantity;
        }

        // Step 3: one bulk adjustment of durable quantities, once per draft
        self.variants.settle_drafts(&sold).await?;

        // Step 4: drop reconciled drafts and their items
        self.drafts.delete_with_items(promoted.clone()).await?;
        let touched: Vec<i64> = deltas.keys().copied().collect();
        if let Err(e) = self.variants.forget_drafts(touched.clone(), promoted.iter().copied().collect()).await {
            warn!(error = %e, "Settled draft markers kept");
        }

        // Step 5: touched records rehydrate from the corrected quantities
        let mut invalidated = self.cache.invalidate(touched).await?;

        // Step 6: clean pass over rejected drafts. Their records are dropped
        // too, which heals stock a failed checkout left decremented.
        let (_, purged_items) = self.drafts.delete_with_items(rejected.clone()).await?;
        let purged: HashSet<i64> = purged_items.iter().map(|item| item.product_variant_id).collect();
        invalidated += self.cache.invalidate(purged.into_iter().collect()).await?;

        let report = ReconciliationReport {
            promoted_drafts: promoted.len(),
            rejected_drafts: rejected.len(),
            applied_deltas: deltas,
            invalidated,
        };
        info!(
            promoted = report.promoted_drafts,
            rejected = report.rejected_drafts,
            variants = report.applied_deltas.len(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Reconciliation job started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Reconciliation aborted, retrying next tick");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Reconciliation job stopped");
                    return;
                }
            }
        }
    }
}
