use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::{DraftClient, ItemClient, PaymentClient, VariantClient};
use crate::actor_framework::ResourceClient;
use crate::aggregator::StockAggregator;
use crate::cache::{CacheClient, ReservationOutcome, ReservationRequest, StockRecord};
use crate::domain::{
    CheckoutReceipt, CheckoutRequest, DraftOrder, DraftPatch, ItemOwner, Order, OrderCreate, OrderItem,
    OrderStatus, PaymentCreate, PaymentEvent, PaymentInfo, PaymentMethod, PaymentStatus, Promotion,
};
use crate::error::OrderError;
use crate::events::{DomainEvent, EventPublisher, PaymentCreated};
use crate::legacy::{LegacyQueue, OrderCreationMessage};
use crate::payment::{LineItem, PaymentLink, PaymentOutcomes, PaymentProvider};

/// Knobs of the synchronous checkout path.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutSettings {
    pub cache_ttl: Duration,
    pub reservation_attempts: u32,
}

/// Everything the order client talks to besides its own table.
#[derive(Clone)]
pub struct OrderDependencies {
    pub items: ItemClient,
    pub drafts: DraftClient,
    pub variants: VariantClient,
    pub payments: PaymentClient,
    pub cache: CacheClient,
    pub aggregator: Arc<StockAggregator>,
    pub provider: Arc<dyn PaymentProvider>,
    pub events: EventPublisher,
    pub legacy_queue: LegacyQueue,
}

/// Client for the Order table and orchestrator of the checkout flow:
/// reservation against the cache, draft staging, the payment branch and
/// promotion of drafts into durable orders.
#[derive(Clone)]
pub struct OrderClient {
    pub(super) inner: ResourceClient<Order>,
    pub(super) deps: OrderDependencies,
    pub(super) settings: CheckoutSettings,
}

crate::impl_client_methods!(OrderClient, Order, order);

impl OrderClient {
    pub fn new(inner: ResourceClient<Order>, deps: OrderDependencies, settings: CheckoutSettings) -> Self {
        Self { inner, deps, settings }
    }

    #[instrument(skip(self, request), fields(user_id = request.user_id, lines = request.lines.len(), total = %request.total))]
    pub async fn create_order(&self, request: CheckoutRequest) -> Result<CheckoutReceipt, OrderError> {
        info!("Processing create_order request");
        request.validate()?;

        // Step 1: reserve stock in the cache
        self.reserve(&request.reservation()).await?;
        info!("Stock reserved");

        // Step 2: stage the draft. From here on the reservation is only ever
        // given back by rejecting the draft.
        let (draft, items) = self.deps.drafts.stage(request.draft(), &request.reservation_lines()).await?;

        let (draft, payment) = match self.open_payment(&draft).await {
            Ok(opened) => opened,
            Err(e) => {
                self.abandon_draft(draft.id, &e).await;
                return Err(e);
            }
        };

        // Step 3: payment branch
        match draft.payment_method {
            PaymentMethod::CashOnDelivery => {
                let order = match self.promote(draft.id, OrderStatus::Pending).await {
                    Ok(order) => order,
                    Err(e) => {
                        self.abandon_draft(draft.id, &e).await;
                        return Err(e);
                    }
                };
                info!(order_id = order.id, "Cash on delivery order placed");
                let draft = self.deps.drafts.fetch_draft(draft.id).await?;
                Ok(CheckoutReceipt::Placed { draft, order, items, payment })
            }
            PaymentMethod::BankTransfer => self.start_bank_transfer(draft, items, payment).await,
        }
    }

    /// Runs the reservation script, hydrating missed variants from the
    /// durable store between attempts.
    #[instrument(skip(self, request), fields(lines = request.lines.len()))]
    pub async fn reserve(&self, request: &ReservationRequest) -> Result<(), OrderError> {
        for attempt in 1..=self.settings.reservation_attempts {
            match self.deps.cache.reserve(request).await? {
                ReservationOutcome::Reserved => return Ok(()),
                ReservationOutcome::Miss(variant_ids) => {
                    debug!(attempt, ?variant_ids, "Cache miss, hydrating");
                    self.hydrate(&variant_ids).await?;
                }
                ReservationOutcome::Insufficient(variant_id) => {
                    info!(variant_id, "Insufficient stock");
                    return Err(OrderError::InsufficientStock { variant_id });
                }
                ReservationOutcome::InvalidPrice(variant_id) => {
                    warn!(variant_id, "Submitted price does not match");
                    return Err(OrderError::InvalidPrice { variant_id });
                }
                ReservationOutcome::InvalidTotal(computed) => {
                    warn!(%computed, "Submitted total does not match");
                    return Err(OrderError::InvalidTotal { computed });
                }
            }
        }
        error!(attempts = self.settings.reservation_attempts, "Reservation kept missing the cache");
        Err(OrderError::Internal(format!(
            "stock still missing from cache after {} attempts",
            self.settings.reservation_attempts
        )))
    }

    /// Loads variants into the cache with availability net of every
    /// outstanding draft reservation. Live records are never overwritten.
    #[instrument(skip(self))]
    pub async fn hydrate(&self, variant_ids: &[i64]) -> Result<(), OrderError> {
        let mut ids: Vec<i64> = variant_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let variants = self.deps.variants.get_variants(ids.clone()).await?;
        if let Some(missing) = ids.iter().find(|id| !variants.iter().any(|v| v.id == **id)) {
            return Err(OrderError::NotFound(format!("product variant {}", missing)));
        }

        let reserved = self.deps.drafts.reserved_quantities(ids, None).await?;
        for variant in &variants {
            let held = reserved.get(&variant.id).copied().unwrap_or(0);
            let record = StockRecord::from_variant(variant, held);
            let written = self.deps.cache.seed_stock(&record, self.settings.cache_ttl).await?;
            debug!(variant_id = variant.id, available = record.quantity, written, "Hydrated stock record");
        }
        Ok(())
    }

    /// Creates the payment record and links it to the draft.
    async fn open_payment(&self, draft: &DraftOrder) -> Result<(DraftOrder, PaymentInfo), OrderError> {
        let payment = self
            .deps
            .payments
            .open(PaymentCreate { amount: draft.total, method: draft.payment_method })
            .await?;
        let patch = DraftPatch { payment_info_id: Some(payment.id), ..DraftPatch::default() };
        let draft = self.deps.drafts.update_draft(draft.id, patch).await?;
        Ok((draft, payment))
    }

    #[instrument(skip(self, draft, items, payment), fields(draft_id = draft.id))]
    async fn start_bank_transfer(
        &self,
        draft: DraftOrder,
        items: Vec<OrderItem>,
        payment: PaymentInfo,
    ) -> Result<CheckoutReceipt, OrderError> {
        let line_items = match self.line_items(&items).await {
            Ok(line_items) => line_items,
            Err(e) => {
                self.abandon_payment(draft.id, payment.id, &e).await;
                return Err(e);
            }
        };
        let link = match self.deps.provider.create_payment_link(draft.id, draft.total, line_items).await {
            Ok(link) => link,
            Err(e) => {
                error!(error = %e, "Payment link creation failed, rolling back reservation");
                let reason = format!("payment link creation failed: {}", e);
                if let Err(rollback) = self.fail_payment(draft.id, reason).await {
                    error!(error = %rollback, "Rollback after link failure failed");
                }
                return Err(e.into());
            }
        };

        let payment = match self.publish_link(&draft, payment.id, link.clone()).await {
            Ok(payment) => payment,
            Err(e) => {
                self.abandon_payment(draft.id, payment.id, &e).await;
                return Err(e);
            }
        };
        info!(payment_id = payment.id, "Awaiting bank transfer");
        Ok(CheckoutReceipt::AwaitingPayment { draft, items, payment, payment_link: link.link })
    }

    /// Records the link on the payment and hands it to the watchers.
    async fn publish_link(&self, draft: &DraftOrder, payment_id: i64, link: PaymentLink) -> Result<PaymentInfo, OrderError> {
        let reference = link.reference.clone();
        self.deps.payments.attach_link(payment_id, link).await?;
        let event = DomainEvent::PaymentCreated(PaymentCreated { draft_id: draft.id, payment_id, reference });
        if let Err(e) = self.deps.events.publish(event).await {
            // The link is live; a later startup scan can still pick it up.
            warn!(error = %e, "Payment created event not published");
        }
        self.deps.payments.fetch_payment(payment_id).await
    }

    /// Abandons a bank-transfer draft after a persistence failure and cancels
    /// its payment. A capture reported later is flagged for a manual refund.
    async fn abandon_payment(&self, draft_id: i64, payment_id: i64, cause: &OrderError) {
        self.abandon_draft(draft_id, cause).await;
        let reason = Some(format!("checkout failed: {}", cause));
        if let Err(e) = self.deps.payments.apply(payment_id, PaymentEvent::Cancel, reason).await {
            error!(payment_id, error = %e, "Payment of abandoned draft not cancelled");
        }
    }

    async fn line_items(&self, items: &[OrderItem]) -> Result<Vec<LineItem>, OrderError> {
        let ids = items.iter().map(|item| item.product_variant_id).collect();
        let variants = self.deps.variants.get_variants(ids).await?;
        Ok(items
            .iter()
            .map(|item| LineItem {
                name: variants
                    .iter()
                    .find(|v| v.id == item.product_variant_id)
                    .map(|v| v.product_name.clone())
                    .unwrap_or_else(|| format!("variant {}", item.product_variant_id)),
                quantity: item.quantity,
                price: item.price,
            })
            .collect())
    }

    /// Copies a draft and its items into a durable order. Idempotent: an
    /// already promoted draft yields its existing order. The draft decision
    /// is the single point that settles concurrent promotions; a loser
    /// removes the order it created.
    #[instrument(skip(self))]
    pub async fn promote(&self, draft_id: i64, status: OrderStatus) -> Result<Order, OrderError> {
        let draft = self.deps.drafts.fetch_draft(draft_id).await?;
        match draft.promotion {
            Promotion::Promoted(order_id) => return self.fetch_order(order_id).await,
            Promotion::Rejected => {
                return Err(OrderError::Validation(format!("draft {} was rejected", draft_id)));
            }
            Promotion::Undecided => {}
        }

        let items = self.deps.drafts.items_of(draft_id).await?;
        let order = self.inner.create(OrderCreate::from_draft(&draft, status)).await?;
        let copies = self.deps.items.copy_to(&items, ItemOwner::Order(order.id)).await;

        let decided = match copies {
            Ok(_) => self.deps.drafts.decide(draft_id, Promotion::Promoted(order.id)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = decided {
            warn!(order_id = order.id, error = %e, "Promotion lost, removing order");
            self.remove_order(order.id).await;
            return match self.deps.drafts.fetch_draft(draft_id).await?.promotion {
                Promotion::Promoted(winner) => self.fetch_order(winner).await,
                _ => Err(e),
            };
        }

        let mirror = DraftPatch { status: Some(status), ..DraftPatch::default() };
        if let Err(e) = self.deps.drafts.update_draft(draft_id, mirror).await {
            warn!(error = %e, "Draft status not mirrored");
        }
        info!(order_id = order.id, %status, "Draft promoted");
        Ok(order)
    }

    async fn remove_order(&self, order_id: i64) {
        if let Err(e) = self.deps.items.delete_owned_by(ItemOwner::Order(order_id)).await {
            warn!(order_id, error = %e, "Could not remove order items");
        }
        if let Err(e) = self.inner.delete(order_id).await {
            warn!(order_id, error = %e, "Could not remove order");
        }
    }

    /// Rejects a draft and puts its reserved units back into the cache.
    /// Returns false when the draft had already been rejected, in which case
    /// nothing is restored a second time.
    #[instrument(skip(self))]
    pub async fn reject_draft(&self, draft_id: i64) -> Result<bool, OrderError> {
        if !self.deps.drafts.decide(draft_id, Promotion::Rejected).await? {
            debug!("Draft already rejected");
            return Ok(false);
        }
        for item in self.deps.drafts.items_of(draft_id).await? {
            if let Err(e) = self.deps.cache.restore_stock(item.product_variant_id, item.quantity).await {
                // The clean pass invalidates these records, which heals them.
                warn!(variant_id = item.product_variant_id, error = %e, "Cache stock not restored");
            }
        }
        info!("Draft rejected, stock restored");
        Ok(true)
    }

    /// Marks a draft rejected after a persistence failure without touching
    /// the cache; reconciliation's clean pass recovers the stock.
    async fn abandon_draft(&self, draft_id: i64, cause: &OrderError) {
        warn!(draft_id, error = %cause, "Abandoning draft");
        if let Err(e) = self.deps.drafts.decide(draft_id, Promotion::Rejected).await {
            error!(draft_id, error = %e, "Could not abandon draft");
        }
    }

    /// Legacy producer: stages a cash-on-delivery draft and queues it for the
    /// version-checked consumer instead of reserving against the cache.
    #[instrument(skip(self, request), fields(user_id = request.user_id, lines = request.lines.len()))]
    pub async fn submit_legacy(&self, request: CheckoutRequest) -> Result<DraftOrder, OrderError> {
        request.validate()?;
        if request.payment_method != PaymentMethod::CashOnDelivery {
            return Err(OrderError::Validation("legacy path only takes cash on delivery".to_string()));
        }

        let (draft, _) = self.deps.drafts.stage(request.draft(), &request.reservation_lines()).await?;
        let (draft, _) = match self.open_payment(&draft).await {
            Ok(opened) => opened,
            Err(e) => {
                self.abandon_draft(draft.id, &e).await;
                return Err(e);
            }
        };

        let message = OrderCreationMessage { draft_id: draft.id, request };
        if let Err(e) = self.deps.legacy_queue.publish(&message) {
            let err = OrderError::from(e);
            self.abandon_draft(draft.id, &err).await;
            return Err(err);
        }
        info!(draft_id = draft.id, "Legacy order queued");
        Ok(draft)
    }

    /// Compensating action of the dead-letter path: drops the draft, its items
    /// and payment, and forgets cached stock of the touched variants.
    #[instrument(skip(self))]
    pub async fn discard_draft(&self, draft_id: i64) -> Result<(), OrderError> {
        let Some(draft) = self.deps.drafts.get_draft(draft_id).await? else {
            debug!("Draft already gone");
            return Ok(());
        };
        if let Promotion::Promoted(order_id) = draft.promotion {
            return Err(OrderError::Validation(format!(
                "draft {} already became order {}",
                draft_id, order_id
            )));
        }

        self.deps.drafts.decide(draft_id, Promotion::Rejected).await?;
        if let Some(payment_id) = draft.payment_info_id {
            let reason = Some("order discarded".to_string());
            if let Err(e) = self.deps.payments.apply(payment_id, PaymentEvent::Cancel, reason).await {
                warn!(payment_id, error = %e, "Payment not cancelled");
            }
        }
        let (_, items) = self.deps.drafts.delete_with_items(HashSet::from([draft_id])).await?;
        let touched: Vec<i64> = items.iter().map(|item| item.product_variant_id).collect();
        self.deps.cache.invalidate(touched).await?;
        info!(items = items.len(), "Draft discarded");
        Ok(())
    }
}

#[async_trait]
impl PaymentOutcomes for OrderClient {
    /// Payment settled: mark it successful, then promote the draft.
    #[instrument(skip(self))]
    async fn complete_payment(&self, draft_id: i64) -> Result<(), OrderError> {
        let draft = self.deps.drafts.fetch_draft(draft_id).await?;
        let payment_id = draft
            .payment_info_id
            .ok_or_else(|| OrderError::NotFound(format!("payment of draft {}", draft_id)))?;
        if draft.promotion == Promotion::Rejected {
            return self.refund_rejected_capture(draft_id, payment_id).await;
        }

        self.deps.payments.apply(payment_id, PaymentEvent::Succeed, None).await?;
        self.promote(draft_id, OrderStatus::Confirmed).await?;
        Ok(())
    }

    /// Payment dropped: give the stock back and cancel the payment.
    #[instrument(skip(self))]
    async fn fail_payment(&self, draft_id: i64, reason: String) -> Result<(), OrderError> {
        let draft = self.deps.drafts.fetch_draft(draft_id).await?;
        if let Promotion::Promoted(order_id) = draft.promotion {
            return Err(OrderError::Validation(format!(
                "draft {} was already promoted to order {}",
                draft_id, order_id
            )));
        }

        self.reject_draft(draft_id).await?;
        if let Some(payment_id) = draft.payment_info_id {
            self.deps.payments.apply(payment_id, PaymentEvent::Cancel, Some(reason)).await?;
        }
        Ok(())
    }
}

impl OrderClient {
    /// The provider captured funds for a draft that was already rejected.
    /// A still pending payment is recorded as settled and then refunded; any
    /// other status cannot take the capture and needs a manual refund.
    #[instrument(skip(self))]
    async fn refund_rejected_capture(&self, draft_id: i64, payment_id: i64) -> Result<(), OrderError> {
        let payment = self.deps.payments.fetch_payment(payment_id).await?;
        match payment.status {
            PaymentStatus::Pending | PaymentStatus::Success => {
                self.deps.payments.apply(payment_id, PaymentEvent::Succeed, None).await?;
                self.deps.payments.apply(payment_id, PaymentEvent::Refund, None).await?;
                warn!(payment_id, "Capture for a rejected draft refunded");
            }
            PaymentStatus::Refund => debug!(payment_id, "Capture already refunded"),
            PaymentStatus::Canceled => {
                error!(payment_id, amount = %payment.amount, "Capture for a rejected draft hit a cancelled payment, refund manually");
            }
        }
        Ok(())
    }
}
