use std::collections::HashSet;
use tracing::{debug, instrument};

use crate::actor_framework::ResourceClient;
use crate::cache::ReservationLine;
use crate::domain::{ItemOwner, OrderItem, OrderItemCreate};
use crate::error::OrderError;

/// Client for the item table shared by drafts and orders.
#[derive(Clone)]
pub struct ItemClient {
    inner: ResourceClient<OrderItem>,
}

crate::impl_basic_client!(ItemClient, OrderItem, item);

impl ItemClient {
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn create_for(&self, owner: ItemOwner, lines: &[ReservationLine]) -> Result<Vec<OrderItem>, OrderError> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let payload = OrderItemCreate {
                owner,
                product_variant_id: line.variant_id,
                quantity: line.quantity,
                price: line.unit_price,
            };
            items.push(self.inner.create(payload).await?);
        }
        debug!(count = items.len(), "Created items");
        Ok(items)
    }

    /// Creates copies of `items` under a new owner. The originals are left in place.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn copy_to(&self, items: &[OrderItem], owner: ItemOwner) -> Result<Vec<OrderItem>, OrderError> {
        let mut copies = Vec::with_capacity(items.len());
        for item in items {
            copies.push(self.inner.create(OrderItemCreate::copied_to(item, owner)).await?);
        }
        Ok(copies)
    }

    #[instrument(skip(self))]
    pub async fn owned_by(&self, owner: ItemOwner) -> Result<Vec<OrderItem>, OrderError> {
        Ok(self.inner.query(move |item| item.owner == owner).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_owned_by(&self, owner: ItemOwner) -> Result<Vec<OrderItem>, OrderError> {
        Ok(self.inner.delete_where(move |item| item.owner == owner).await?)
    }

    #[instrument(skip(self, draft_ids), fields(drafts = draft_ids.len()))]
    pub async fn owned_by_drafts(&self, draft_ids: HashSet<i64>) -> Result<Vec<OrderItem>, OrderError> {
        Ok(self.inner.query(move |item| draft_owner_in(item, &draft_ids)).await?)
    }

    #[instrument(skip(self, draft_ids), fields(drafts = draft_ids.len()))]
    pub async fn delete_owned_by_drafts(&self, draft_ids: HashSet<i64>) -> Result<Vec<OrderItem>, OrderError> {
        Ok(self.inner.delete_where(move |item| draft_owner_in(item, &draft_ids)).await?)
    }
}

fn draft_owner_in(item: &OrderItem, draft_ids: &HashSet<i64>) -> bool {
    matches!(item.owner, ItemOwner::Draft(id) if draft_ids.contains(&id))
}
