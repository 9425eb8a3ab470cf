use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::actor_framework::ResourceClient;
use crate::domain::{ProductVariant, VariantCreate, VariantPatch};
use crate::error::OrderError;
use crate::variant_actor::{VariantAction, VariantActionResult};

/// Client for the durable variant table.
#[derive(Clone)]
pub struct VariantClient {
    inner: ResourceClient<ProductVariant>,
}

crate::impl_basic_client!(VariantClient, ProductVariant, variant);

impl VariantClient {
    #[instrument(skip(self))]
    pub async fn create_variant(&self, payload: VariantCreate) -> Result<ProductVariant, OrderError> {
        debug!("Sending request");
        Ok(self.inner.create(payload).await?)
    }

    #[instrument(skip(self))]
    pub async fn update_variant(&self, id: i64, patch: VariantPatch) -> Result<ProductVariant, OrderError> {
        debug!("Sending request");
        Ok(self.inner.update(id, patch).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_variants(&self, ids: Vec<i64>) -> Result<Vec<ProductVariant>, OrderError> {
        debug!("Sending request");
        Ok(self.inner.get_many(ids).await?)
    }

    /// Bulk increment/decrement of durable quantities in one all-or-nothing
    /// batch. Zero deltas are skipped. Returns the new quantity per variant.
    #[instrument(skip(self), fields(variants = deltas.len()))]
    pub async fn apply_deltas(&self, deltas: &HashMap<i64, i64>) -> Result<HashMap<i64, i64>, OrderError> {
        let mut ids: Vec<i64> = deltas.iter().filter(|(_, d)| **d != 0).map(|(id, _)| *id).collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        ids.sort_unstable();

        let actions = ids
            .iter()
            .map(|id| (*id, VariantAction::AdjustQuantity(deltas[id])))
            .collect();
        let results = self.inner.perform_batch(actions).await?;

        let mut quantities = HashMap::with_capacity(ids.len());
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                VariantActionResult::Adjusted { quantity } => {
                    quantities.insert(id, quantity);
                }
                other => return Err(OrderError::Internal(format!("unexpected variant result {:?}", other))),
            }
        }
        info!(variants = quantities.len(), "Applied durable stock deltas");
        Ok(quantities)
    }

    /// Subtracts units sold by promoted drafts, keyed by `(variant, draft)`.
    /// Every pair applies at most once per variant row, so repeating a batch
    /// after a partial reconciliation leaves quantities as they were.
    #[instrument(skip(self, sold), fields(pairs = sold.len()))]
    pub async fn settle_drafts(&self, sold: &HashMap<(i64, i64), i64>) -> Result<HashMap<i64, i64>, OrderError> {
        let mut pairs: Vec<(i64, i64)> = sold.keys().copied().collect();
        if pairs.is_empty() {
            return Ok(HashMap::new());
        }
        pairs.sort_unstable();

        let actions = pairs
            .iter()
            .map(|(variant_id, draft_id)| {
                let delta = -sold[&(*variant_id, *draft_id)];
                (*variant_id, VariantAction::SettleDraft { draft_id: *draft_id, delta })
            })
            .collect();
        let results = self.inner.perform_batch(actions).await?;

        let mut quantities = HashMap::new();
        for ((variant_id, _), result) in pairs.into_iter().zip(results) {
            match result {
                VariantActionResult::Adjusted { quantity } => {
                    quantities.insert(variant_id, quantity);
                }
                other => return Err(OrderError::Internal(format!("unexpected variant result {:?}", other))),
            }
        }
        info!(variants = quantities.len(), "Settled promoted drafts");
        Ok(quantities)
    }

    /// Clears settled-draft markers of drafts that no longer exist.
    #[instrument(skip(self, variant_ids, draft_ids))]
    pub async fn forget_drafts(&self, variant_ids: Vec<i64>, draft_ids: Vec<i64>) -> Result<(), OrderError> {
        if variant_ids.is_empty() || draft_ids.is_empty() {
            return Ok(());
        }
        let actions = variant_ids
            .into_iter()
            .map(|id| (id, VariantAction::ForgetDrafts(draft_ids.clone())))
            .collect();
        self.inner.perform_batch(actions).await?;
        Ok(())
    }

    /// Optimistic version bump over every `(variant, expected version)` pair.
    /// Any stale version fails the whole batch with a version conflict.
    #[instrument(skip(self))]
    pub async fn bump_versions(&self, expected: Vec<(i64, u64)>) -> Result<(), OrderError> {
        let actions = expected
            .into_iter()
            .map(|(id, version)| (id, VariantAction::BumpVersion { expected: version }))
            .collect();
        self.inner.perform_batch(actions).await?;
        Ok(())
    }
}
