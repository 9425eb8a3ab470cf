use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::actor_framework::{Entity, ResourceActor, ResourceClient};
use crate::aggregator::{AggregatorFlusher, StockAggregator};
use crate::cache::{CacheClient, StockCacheService};
use crate::clients::{
    CheckoutSettings, DraftClient, ItemClient, OrderClient, OrderDependencies, PaymentClient, VariantClient,
};
use crate::config::Config;
use crate::events::EventBus;
use crate::legacy::{DeadLetterConsumer, LegacyOrderConsumer, LegacyQueue};
use crate::payment::{PaymentProvider, PaymentWatcher};
use crate::reconciliation::ReconciliationJob;

/// Spawns a table actor with its own id sequence starting at 1.
pub(crate) fn spawn_table<T: Entity<Id = i64>>(buffer: usize) -> (ResourceClient<T>, JoinHandle<()>) {
    let counter = Arc::new(AtomicI64::new(1));
    let next_id = move || counter.fetch_add(1, Ordering::SeqCst);
    let (actor, client) = ResourceActor::<T>::new(buffer, next_id);
    (client, tokio::spawn(actor.run()))
}

/// The main application system that orchestrates all actors.
///
/// Responsible for starting up actors and background routines, wiring them
/// together, and handling shutdown.
pub struct OrderSystem {
    pub config: Config,
    pub order_client: OrderClient,
    pub variant_client: VariantClient,
    pub draft_client: DraftClient,
    pub payment_client: PaymentClient,
    pub cache_client: CacheClient,
    pub aggregator: Arc<StockAggregator>,
    pub watcher: Arc<PaymentWatcher>,
    pub legacy_queue: LegacyQueue,
    pub dead_letter_queue: LegacyQueue,
    shutdown: CancellationToken,
    actor_handles: Vec<JoinHandle<()>>,
    background_handles: Vec<JoinHandle<()>>,
}

impl OrderSystem {
    pub fn new(config: Config, provider: Arc<dyn PaymentProvider>) -> Self {
        let buffer = config.actor_buffer;
        let shutdown = CancellationToken::new();

        // 1. Durable tables
        let (variants, variant_handle) = spawn_table(buffer);
        let (drafts, draft_handle) = spawn_table(buffer);
        let (items, item_handle) = spawn_table(buffer);
        let (orders, order_handle) = spawn_table(buffer);
        let (payments, payment_handle) = spawn_table(buffer);

        let variant_client = VariantClient::new(variants);
        let item_client = ItemClient::new(items);
        let draft_client = DraftClient::new(drafts, item_client.clone());
        let payment_client = PaymentClient::new(payments);

        // 2. Stock cache
        let (cache_service, cache_client) = StockCacheService::new(buffer);
        let cache_handle = tokio::spawn(cache_service.run());

        // 3. Aggregator, event bus and legacy queues
        let aggregator = Arc::new(StockAggregator::new());
        let (mut event_bus, events) = EventBus::new(buffer, config.event_redeliveries);
        let dead_letter_queue = LegacyQueue::new("orders.create.dlq", None);
        let legacy_queue = LegacyQueue::new("orders.create", Some(dead_letter_queue.clone()));

        // 4. Order orchestration
        let order_client = OrderClient::new(
            orders,
            OrderDependencies {
                items: item_client,
                drafts: draft_client.clone(),
                variants: variant_client.clone(),
                payments: payment_client.clone(),
                cache: cache_client.clone(),
                aggregator: aggregator.clone(),
                provider: provider.clone(),
                events,
                legacy_queue: legacy_queue.clone(),
            },
            CheckoutSettings {
                cache_ttl: config.cache_ttl,
                reservation_attempts: config.reservation_attempts,
            },
        );

        // 5. Payment watcher subscribed to the bus
        let watcher = Arc::new(PaymentWatcher::new(
            provider,
            Arc::new(order_client.clone()),
            config.payment_poll_interval,
            shutdown.child_token(),
        ));
        event_bus.subscribe(watcher.clone());

        // 6. Background routines
        let flusher = AggregatorFlusher::new(
            aggregator.clone(),
            variant_client.clone(),
            cache_client.clone(),
            config.aggregator_flush_interval,
        );
        let reconciliation = ReconciliationJob::new(
            draft_client.clone(),
            variant_client.clone(),
            cache_client.clone(),
            config.reconcile_interval,
        );
        let legacy_consumer = LegacyOrderConsumer::new(
            legacy_queue.clone(),
            order_client.clone(),
            draft_client.clone(),
            variant_client.clone(),
            cache_client.clone(),
            config.legacy_max_retries,
        );
        let dead_letter_consumer =
            DeadLetterConsumer::new(dead_letter_queue.clone(), order_client.clone(), config.legacy_max_retries);

        let background_handles = vec![
            tokio::spawn(event_bus.run(shutdown.clone())),
            tokio::spawn(legacy_consumer.run(shutdown.clone())),
            tokio::spawn(dead_letter_consumer.run(shutdown.clone())),
            tokio::spawn(reconciliation.run(shutdown.clone())),
            tokio::spawn(flusher.run(shutdown.clone())),
        ];

        info!("Order system started");
        Self {
            config,
            order_client,
            variant_client,
            draft_client,
            payment_client,
            cache_client,
            aggregator,
            watcher,
            legacy_queue,
            dead_letter_queue,
            shutdown,
            actor_handles: vec![
                variant_handle,
                draft_handle,
                item_handle,
                order_handle,
                payment_handle,
                cache_handle,
            ],
            background_handles,
        }
    }

    /// A reconciliation job over the live actors, for on-demand runs.
    pub fn reconciliation(&self) -> ReconciliationJob {
        ReconciliationJob::new(
            self.draft_client.clone(),
            self.variant_client.clone(),
            self.cache_client.clone(),
            self.config.reconcile_interval,
        )
    }

    /// An aggregator flusher over the live actors, for on-demand flushes.
    pub fn flusher(&self) -> AggregatorFlusher {
        AggregatorFlusher::new(
            self.aggregator.clone(),
            self.variant_client.clone(),
            self.cache_client.clone(),
            self.config.aggregator_flush_interval,
        )
    }

    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down system...");

        // Background routines first: the flusher drains into live actors.
        self.shutdown.cancel();
        for handle in self.background_handles {
            if let Err(e) = handle.await {
                error!("Background task failed: {:?}", e);
                return Err(format!("Background task failed: {:?}", e));
            }
        }
        self.watcher.shutdown().await;

        if let Err(e) = self.cache_client.shutdown().await {
            error!(error = %e, "Cache shutdown request failed");
        }

        // Table actors stop once every client handle is gone.
        drop(self.order_client);
        drop(self.variant_client);
        drop(self.draft_client);
        drop(self.payment_client);
        drop(self.cache_client);
        drop(self.watcher);

        for handle in self.actor_handles {
            if let Err(e) = handle.await {
                error!("Actor task failed: {:?}", e);
                return Err(format!("Actor task failed: {:?}", e));
            }
        }

        info!("System shutdown complete.");
        Ok(())
    }
}
