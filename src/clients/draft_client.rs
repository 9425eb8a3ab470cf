use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

use super::ItemClient;
use crate::actor_framework::ResourceClient;
use crate::cache::ReservationLine;
use crate::domain::{DraftCreate, DraftOrder, DraftPatch, ItemOwner, OrderItem, Promotion};
use crate::draft_actor::{DraftAction, DraftActionResult};
use crate::error::OrderError;

/// Client for the draft table and the items drafts own.
#[derive(Clone)]
pub struct DraftClient {
    inner: ResourceClient<DraftOrder>,
    items: ItemClient,
}

crate::impl_client_methods!(DraftClient, DraftOrder, draft);

impl DraftClient {
    pub fn new(inner: ResourceClient<DraftOrder>, items: ItemClient) -> Self {
        Self { inner, items }
    }

    /// Persists a draft with one item per line. If the items cannot be written
    /// the draft is marked rejected so the clean pass purges whatever landed.
    #[instrument(skip(self, lines), fields(user_id = draft.user_id, lines = lines.len()))]
    pub async fn stage(
        &self,
        draft: DraftCreate,
        lines: &[ReservationLine],
    ) -> Result<(DraftOrder, Vec<OrderItem>), OrderError> {
        let draft = self.inner.create(draft).await?;
        match self.items.create_for(ItemOwner::Draft(draft.id), lines).await {
            Ok(items) => {
                info!(draft_id = draft.id, total = %draft.total, "Draft staged");
                Ok((draft, items))
            }
            Err(e) => {
                warn!(draft_id = draft.id, error = %e, "Item persistence failed, rejecting draft");
                if let Err(reject_err) = self.decide(draft.id, Promotion::Rejected).await {
                    warn!(draft_id = draft.id, error = %reject_err, "Could not reject half-staged draft");
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn items_of(&self, draft_id: i64) -> Result<Vec<OrderItem>, OrderError> {
        self.items.owned_by(ItemOwner::Draft(draft_id)).await
    }

    #[instrument(skip(self, draft_ids), fields(drafts = draft_ids.len()))]
    pub async fn items_of_drafts(&self, draft_ids: HashSet<i64>) -> Result<Vec<OrderItem>, OrderError> {
        self.items.owned_by_drafts(draft_ids).await
    }

    /// Records the promotion outcome. Returns whether this call made the
    /// decision; `false` means the same outcome was already recorded.
    #[instrument(skip(self))]
    pub async fn decide(&self, draft_id: i64, promotion: Promotion) -> Result<bool, OrderError> {
        match self.inner.perform_action(draft_id, DraftAction::Decide(promotion)).await? {
            DraftActionResult::Decided { changed, .. } => {
                debug!(changed, "Draft decision recorded");
                Ok(changed)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn update_draft(&self, draft_id: i64, patch: DraftPatch) -> Result<DraftOrder, OrderError> {
        Ok(self.inner.update(draft_id, patch).await?)
    }

    /// Drafts whose promotion outcome is known, promoted or rejected.
    #[instrument(skip(self))]
    pub async fn decided_drafts(&self) -> Result<Vec<DraftOrder>, OrderError> {
        Ok(self.inner.query(|draft| draft.promotion.is_decided()).await?)
    }

    /// Quantity per variant held by drafts that have not been rejected,
    /// optionally ignoring one draft.
    #[instrument(skip(self))]
    pub async fn reserved_quantities(
        &self,
        variant_ids: Vec<i64>,
        exclude_draft: Option<i64>,
    ) -> Result<HashMap<i64, i64>, OrderError> {
        let holding: HashSet<i64> = self
            .inner
            .query(move |draft| draft.holds_stock() && Some(draft.id) != exclude_draft)
            .await?
            .into_iter()
            .map(|draft| draft.id)
            .collect();

        let wanted: HashSet<i64> = variant_ids.into_iter().collect();
        let mut reserved = HashMap::new();
        for item in self.items.owned_by_drafts(holding).await? {
            if wanted.contains(&item.product_variant_id) {
                *reserved.entry(item.product_variant_id).or_insert(0) += item.quantity;
            }
        }
        Ok(reserved)
    }

    /// Deletes drafts and the items they own. Items go first so a crash in
    /// between leaves an empty draft rather than orphaned items.
    #[instrument(skip(self, draft_ids), fields(drafts = draft_ids.len()))]
    pub async fn delete_with_items(&self, draft_ids: HashSet<i64>) -> Result<(Vec<DraftOrder>, Vec<OrderItem>), OrderError> {
        if draft_ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let items = self.items.delete_owned_by_drafts(draft_ids.clone()).await?;
        let drafts = self.inner.delete_where(move |draft| draft_ids.contains(&draft.id)).await?;
        debug!(drafts = drafts.len(), items = items.len(), "Deleted drafts with items");
        Ok((drafts, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor_framework::ResourceActor;
    use crate::domain::PaymentMethod;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn spawn_drafts() -> DraftClient {
        let draft_ids = Arc::new(AtomicI64::new(1));
        let item_ids = Arc::new(AtomicI64::new(1));
        let (draft_actor, drafts) = ResourceActor::new(10, move || draft_ids.fetch_add(1, Ordering::SeqCst));
        let (item_actor, items) = ResourceActor::new(10, move || item_ids.fetch_add(1, Ordering::SeqCst));
        tokio::spawn(draft_actor.run());
        tokio::spawn(item_actor.run());
        DraftClient::new(drafts, ItemClient::new(items))
    }

    fn draft_input() -> DraftCreate {
        DraftCreate {
            user_id: 9,
            total: Decimal::from(30),
            shipping_fee: Decimal::ZERO,
            payment_method: PaymentMethod::CashOnDelivery,
        }
    }

    fn line(variant_id: i64, quantity: i64) -> ReservationLine {
        ReservationLine { variant_id, quantity, unit_price: Decimal::from(10) }
    }

    #[tokio::test]
    async fn test_reserved_quantities_skip_rejected_and_excluded() {
        let client = spawn_drafts();
        let (first, _) = client.stage(draft_input(), &[line(1, 2), line(2, 1)]).await.unwrap();
        let (second, _) = client.stage(draft_input(), &[line(1, 3)]).await.unwrap();
        let (third, _) = client.stage(draft_input(), &[line(1, 4)]).await.unwrap();

        client.decide(third.id, Promotion::Rejected).await.unwrap();

        let reserved = client.reserved_quantities(vec![1, 2], None).await.unwrap();
        assert_eq!(reserved, HashMap::from([(1, 5), (2, 1)]));

        let reserved = client.reserved_quantities(vec![1], Some(second.id)).await.unwrap();
        assert_eq!(reserved, HashMap::from([(1, 2)]));
        assert_eq!(client.items_of(first.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_item_write_rejects_the_draft() {
        let client = spawn_drafts();
        let err = client.stage(draft_input(), &[line(1, 1), line(2, 0)]).await.unwrap_err();
        assert!(matches!(err, OrderError::Internal(_)));

        let draft = client.fetch_draft(1).await.unwrap();
        assert_eq!(draft.promotion, Promotion::Rejected);

        let (drafts, items) = client.delete_with_items(HashSet::from([1])).await.unwrap();
        assert_eq!((drafts.len(), items.len()), (1, 1));
        assert_eq!(client.get_draft(1).await.unwrap(), None);
    }
}
