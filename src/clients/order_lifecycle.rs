use tracing::{info, instrument, warn};

use super::OrderClient;
use crate::domain::{ItemOwner, Order, OrderEvent, OrderItem, OrderStatus, PaymentEvent, PaymentStatus};
use crate::error::OrderError;
use crate::order_actor::OrderAction;

/// Post-checkout operations on committed orders and stock.
impl OrderClient {
    /// Runs the lifecycle state machine on a stored order. Cancelled and
    /// returned orders put their units back through the aggregator. Cancelling
    /// refunds a settled payment and cancels a pending one.
    #[instrument(skip(self))]
    pub async fn apply_order_event(&self, order_id: i64, event: OrderEvent) -> Result<Order, OrderError> {
        let change = self.inner.perform_action(order_id, OrderAction::Apply(event)).await?;
        info!(from = %change.from, to = %change.to, "Order status changed");

        let order = self.fetch_order(order_id).await?;
        if change.to.releases_stock() {
            self.release_stock(&order).await?;
        }
        if change.to == OrderStatus::Cancelled {
            self.settle_cancelled_payment(&order).await?;
        }
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn items_of_order(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderError> {
        self.deps.items.owned_by(ItemOwner::Order(order_id)).await
    }

    async fn release_stock(&self, order: &Order) -> Result<(), OrderError> {
        let items = self.items_of_order(order.id).await?;
        for item in &items {
            self.deps.aggregator.add_stock(item.product_variant_id, item.quantity);
        }
        let touched: Vec<i64> = items.iter().map(|item| item.product_variant_id).collect();
        if let Err(e) = self.deps.cache.invalidate(touched).await {
            warn!(order_id = order.id, error = %e, "Cache not invalidated after release");
        }
        info!(order_id = order.id, items = items.len(), "Order stock released");
        Ok(())
    }

    async fn settle_cancelled_payment(&self, order: &Order) -> Result<(), OrderError> {
        let Some(payment_id) = order.payment_info_id else {
            return Ok(());
        };
        let payment = self.deps.payments.fetch_payment(payment_id).await?;
        match payment.status {
            PaymentStatus::Success => {
                self.deps.payments.apply(payment_id, PaymentEvent::Refund, None).await?;
                info!(order_id = order.id, payment_id, "Payment refunded");
            }
            PaymentStatus::Pending => {
                let reason = Some("order cancelled".to_string());
                self.deps.payments.apply(payment_id, PaymentEvent::Cancel, reason).await?;
            }
            PaymentStatus::Canceled | PaymentStatus::Refund => {}
        }
        Ok(())
    }

    /// Admin stock correction. The delta reaches the durable quantity on the
    /// next aggregator flush.
    #[instrument(skip(self))]
    pub async fn adjust_stock(&self, variant_id: i64, delta: i64) -> Result<(), OrderError> {
        self.deps.variants.fetch_variant(variant_id).await?;
        self.deps.aggregator.add_stock(variant_id, delta);
        info!("Stock correction queued");
        Ok(())
    }
}
