use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::queue::{Delivery, LegacyQueue, OrderCreationMessage};
use crate::cache::CacheClient;
use crate::clients::{DraftClient, OrderClient, VariantClient};
use crate::domain::{OrderStatus, Promotion};
use crate::error::OrderError;

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Acked,
    Requeued,
    DeadLettered,
}

/// Fallback order path: checks stock against durable quantities and guards
/// the write with per-row versions instead of the cache script.
pub struct LegacyOrderConsumer {
    queue: LegacyQueue,
    orders: OrderClient,
    drafts: DraftClient,
    variants: VariantClient,
    cache: CacheClient,
    max_retries: u32,
}

impl LegacyOrderConsumer {
    pub fn new(
        queue: LegacyQueue,
        orders: OrderClient,
        drafts: DraftClient,
        variants: VariantClient,
        cache: CacheClient,
        max_retries: u32,
    ) -> Self {
        Self { queue, orders, drafts, variants, cache, max_retries }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(queue = self.queue.name(), "Legacy order consumer started");
        while let Some(delivery) = self.queue.receive(&shutdown).await {
            if let Err(e) = self.handle_delivery(delivery).await {
                error!(error = %e, "Delivery could not be settled");
            }
        }
        info!("Legacy order consumer stopped");
    }

    /// Processes one delivery and settles it: ack on success, requeue on a
    /// retryable failure within the retry budget, dead-letter otherwise.
    #[instrument(skip(self, delivery), fields(tag = delivery.tag, attempts = delivery.attempts))]
    pub async fn handle_delivery(&self, delivery: Delivery) -> Result<Disposition, OrderError> {
        let message: OrderCreationMessage = match delivery.decode() {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Undecodable message");
                self.queue.nack(delivery.tag, false)?;
                return Ok(Disposition::DeadLettered);
            }
        };

        match self.process(&message).await {
            Ok(()) => {
                self.queue.ack(delivery.tag)?;
                Ok(Disposition::Acked)
            }
            Err(e) if e.is_retryable() && delivery.attempts <= self.max_retries => {
                warn!(draft_id = message.draft_id, error = %e, "Legacy order failed, requeueing");
                self.queue.nack(delivery.tag, true)?;
                Ok(Disposition::Requeued)
            }
            Err(e) => {
                warn!(draft_id = message.draft_id, error = %e, "Legacy order failed, dead-lettering");
                self.queue.nack(delivery.tag, false)?;
                Ok(Disposition::DeadLettered)
            }
        }
    }

    #[instrument(skip(self, message), fields(draft_id = message.draft_id))]
    async fn process(&self, message: &OrderCreationMessage) -> Result<(), OrderError> {
        let draft = self.drafts.fetch_draft(message.draft_id).await?;
        match draft.promotion {
            Promotion::Promoted(order_id) => {
                debug!(order_id, "Already promoted");
                return Ok(());
            }
            Promotion::Rejected => {
                return Err(OrderError::Validation(format!("draft {} was rejected", draft.id)));
            }
            Promotion::Undecided => {}
        }

        let request = &message.request;
        let mut wanted: HashMap<i64, i64> = HashMap::new();
        for line in &request.lines {
            *wanted.entry(line.variant_id).or_insert(0) += line.quantity;
        }
        let ids: Vec<i64> = wanted.keys().copied().collect();
        let variants = self.variants.get_variants(ids.clone()).await?;

        // Same order of checks as the cache script: stock, then price, then total
        let reserved = self.drafts.reserved_quantities(ids, Some(draft.id)).await?;
        let mut subtotal = Decimal::ZERO;
        for line in &request.lines {
            let variant = variants
                .iter()
                .find(|v| v.id == line.variant_id)
                .ok_or_else(|| OrderError::NotFound(format!("product variant {}", line.variant_id)))?;
            let available = variant.quantity - reserved.get(&variant.id).copied().unwrap_or(0);
            if wanted[&variant.id] > available {
                return Err(OrderError::InsufficientStock { variant_id: variant.id });
            }
            if line.price != variant.price {
                return Err(OrderError::InvalidPrice { variant_id: variant.id });
            }
            subtotal += variant.price * Decimal::from(line.quantity);
        }
        if subtotal != request.subtotal() {
            return Err(OrderError::InvalidTotal { computed: subtotal });
        }

        // Optimistic lock over every touched row; a concurrent writer turns
        // this into a version conflict.
        let expected = variants.iter().map(|v| (v.id, v.version)).collect();
        self.variants.bump_versions(expected).await?;

        let order = self.orders.promote(draft.id, OrderStatus::Pending).await?;
        let touched = variants.iter().map(|v| v.id).collect();
        if let Err(e) = self.cache.invalidate(touched).await {
            warn!(error = %e, "Cache not invalidated after legacy order");
        }
        info!(order_id = order.id, "Legacy order placed");
        Ok(())
    }
}

/// Drains the dead-letter queue, discarding the draft behind each message.
pub struct DeadLetterConsumer {
    queue: LegacyQueue,
    orders: OrderClient,
    max_retries: u32,
}

impl DeadLetterConsumer {
    pub fn new(queue: LegacyQueue, orders: OrderClient, max_retries: u32) -> Self {
        Self { queue, orders, max_retries }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(queue = self.queue.name(), "Dead-letter consumer started");
        while let Some(delivery) = self.queue.receive(&shutdown).await {
            if let Err(e) = self.handle_delivery(delivery).await {
                error!(error = %e, "Dead letter could not be settled");
            }
        }
        info!("Dead-letter consumer stopped");
    }

    #[instrument(skip(self, delivery), fields(tag = delivery.tag, attempts = delivery.attempts))]
    pub async fn handle_delivery(&self, delivery: Delivery) -> Result<Disposition, OrderError> {
        let message: OrderCreationMessage = match delivery.decode() {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Undecodable dead letter dropped");
                self.queue.ack(delivery.tag)?;
                return Ok(Disposition::Acked);
            }
        };

        match self.orders.discard_draft(message.draft_id).await {
            Ok(()) => {
                self.queue.ack(delivery.tag)?;
                Ok(Disposition::Acked)
            }
            Err(e) if e.is_retryable() && delivery.attempts <= self.max_retries => {
                warn!(draft_id = message.draft_id, error = %e, "Compensation failed, requeueing");
                self.queue.nack(delivery.tag, true)?;
                Ok(Disposition::Requeued)
            }
            Err(e) => {
                error!(draft_id = message.draft_id, error = %e, "Compensation abandoned");
                self.queue.ack(delivery.tag)?;
                Ok(Disposition::Acked)
            }
        }
    }
}
