#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::actor_framework::ResourceClient;
    use crate::aggregator::StockAggregator;
    use crate::app_system::order_system::spawn_table;
    use crate::app_system::OrderSystem;
    use crate::cache::{CacheClient, StockCacheService};
    use crate::clients::{
        CheckoutSettings, DraftClient, ItemClient, OrderClient, OrderDependencies, PaymentClient, VariantClient,
    };
    use crate::domain::{
        CheckoutLine, CheckoutReceipt, CheckoutRequest, OrderEvent, OrderStatus, PaymentInfo, PaymentMethod,
        PaymentStatus, ProductVariant, Promotion, VariantCreate,
    };
    use crate::error::{OrderError, StoreError};
    use crate::events::EventBus;
    use crate::legacy::LegacyQueue;
    use crate::mock_framework::{create_mock_client, expect_action, expect_create, spawn_system, ScriptedPaymentProvider};
    use crate::payment::{PaymentOutcomes, ProviderStatus};
    use crate::payment_actor::{PaymentAction, PaymentActionResult};
    use crate::reconciliation::ReconciliationJob;

    fn price() -> Decimal {
        Decimal::new(10000, 2)
    }

    fn shipping() -> Decimal {
        Decimal::new(1000, 2)
    }

    async fn seed(system: &OrderSystem, quantity: i64) -> ProductVariant {
        system
            .variant_client
            .create_variant(VariantCreate {
                product_id: 1,
                product_name: "Stoneware mug".to_string(),
                image: "mug.png".to_string(),
                price: price(),
                quantity,
            })
            .await
            .unwrap()
    }

    fn request(variant_id: i64, quantity: i64, payment_method: PaymentMethod) -> CheckoutRequest {
        CheckoutRequest {
            user_id: 7,
            lines: vec![CheckoutLine { variant_id, quantity, price: price() }],
            shipping_fee: shipping(),
            total: price() * Decimal::from(quantity) + shipping(),
            payment_method,
        }
    }

    async fn cached_quantity(system: &OrderSystem, variant_id: i64) -> Option<i64> {
        system.cache_client.get_stock(variant_id).await.unwrap().map(|record| record.quantity)
    }

    /// Polls until the draft has a decided promotion or gives up after ~2s.
    async fn wait_for_decision(system: &OrderSystem, draft_id: i64) -> Promotion {
        for _ in 0..100 {
            let draft = system.draft_client.fetch_draft(draft_id).await.unwrap();
            if draft.promotion.is_decided() {
                return draft.promotion;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Promotion::Undecided
    }

    #[tokio::test]
    async fn test_cash_on_delivery_order_is_placed() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 5).await;
        assert_eq!(cached_quantity(&system, mug.id).await, None);

        let receipt = system
            .order_client
            .create_order(request(mug.id, 5, PaymentMethod::CashOnDelivery))
            .await
            .unwrap();

        let CheckoutReceipt::Placed { draft, order, items, payment } = receipt else {
            panic!("cash on delivery must be placed immediately");
        };
        assert_eq!(draft.total, Decimal::new(51000, 2));
        assert_eq!(draft.promotion, Promotion::Promoted(order.id));
        assert_eq!(order.total, draft.total);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.draft_id, draft.id);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].total_price, Decimal::new(50000, 2));
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(order.payment_info_id, Some(payment.id));

        // Reserved in the cache, durable untouched until reconciliation
        assert_eq!(cached_quantity(&system, mug.id).await, Some(0));
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().quantity, 5);

        let order_items = system.order_client.items_of_order(order.id).await.unwrap();
        assert_eq!(order_items.len(), 1);
        assert_eq!(order_items[0].quantity, 5);

        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_sold_out_variant_rejects_without_a_draft() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 5).await;

        let first = system.order_client.create_order(request(mug.id, 5, PaymentMethod::CashOnDelivery)).await.unwrap();
        let second = system.order_client.create_order(request(mug.id, 1, PaymentMethod::CashOnDelivery)).await;

        assert_eq!(second, Err(OrderError::InsufficientStock { variant_id: mug.id }));
        assert_eq!(system.draft_client.get_draft(first.draft().id + 1).await.unwrap(), None);
        assert_eq!(cached_quantity(&system, mug.id).await, Some(0));
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_never_oversell() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 10).await;

        let mut tasks = Vec::new();
        for _ in 0..25 {
            let orders = system.order_client.clone();
            let request = request(mug.id, 1, PaymentMethod::CashOnDelivery);
            tasks.push(tokio::spawn(async move { orders.create_order(request).await }));
        }

        let mut placed = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => placed += 1,
                Err(e) => assert_eq!(e, OrderError::InsufficientStock { variant_id: mug.id }),
            }
        }
        assert_eq!(placed, 10);
        assert_eq!(cached_quantity(&system, mug.id).await, Some(0));

        let report = system.reconciliation().run_once().await.unwrap();
        assert_eq!(report.promoted_drafts, 10);
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_reconciliation_applies_promoted_drafts_once() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 8).await;
        let receipt = system.order_client.create_order(request(mug.id, 5, PaymentMethod::CashOnDelivery)).await.unwrap();

        let report = system.reconciliation().run_once().await.unwrap();
        assert_eq!(report.promoted_drafts, 1);
        assert_eq!(report.applied_deltas, HashMap::from([(mug.id, -5)]));
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().quantity, 3);

        // Draft and its items are gone, the order and its copies stay
        assert_eq!(system.draft_client.get_draft(receipt.draft().id).await.unwrap(), None);
        let order = receipt.order().unwrap();
        assert_eq!(system.order_client.items_of_order(order.id).await.unwrap().len(), 1);
        assert_eq!(cached_quantity(&system, mug.id).await, None);

        let again = system.reconciliation().run_once().await.unwrap();
        assert!(again.is_empty());
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().quantity, 3);

        // Rehydration after invalidation sees the corrected quantity
        system.order_client.create_order(request(mug.id, 1, PaymentMethod::CashOnDelivery)).await.unwrap();
        assert_eq!(cached_quantity(&system, mug.id).await, Some(2));
    }

    #[tokio::test]
    async fn test_hydration_nets_out_undecided_drafts() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 5).await;

        let pending = system.order_client.create_order(request(mug.id, 2, PaymentMethod::BankTransfer)).await.unwrap();
        assert!(matches!(pending, CheckoutReceipt::AwaitingPayment { .. }));
        assert_eq!(cached_quantity(&system, mug.id).await, Some(3));

        // Losing the record must not hand the held units out again
        system.cache_client.invalidate(vec![mug.id]).await.unwrap();
        system.order_client.create_order(request(mug.id, 1, PaymentMethod::CashOnDelivery)).await.unwrap();
        assert_eq!(cached_quantity(&system, mug.id).await, Some(2));
    }

    #[tokio::test]
    async fn test_tampered_price_and_total_are_rejected() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 5).await;

        let mut cheap = request(mug.id, 2, PaymentMethod::CashOnDelivery);
        cheap.lines[0].price = Decimal::new(9000, 2);
        cheap.total = Decimal::new(19000, 2);
        let result = system.order_client.create_order(cheap).await;
        assert_eq!(result, Err(OrderError::InvalidPrice { variant_id: mug.id }));
        assert_eq!(cached_quantity(&system, mug.id).await, Some(5));

        let mut wrong_total = request(mug.id, 2, PaymentMethod::CashOnDelivery);
        wrong_total.total = Decimal::new(15000, 2);
        let result = system.order_client.create_order(wrong_total).await;
        assert_eq!(result, Err(OrderError::InvalidTotal { computed: Decimal::new(20000, 2) }));
        assert_eq!(cached_quantity(&system, mug.id).await, Some(5));
    }

    #[tokio::test]
    async fn test_unknown_variant_is_not_found() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let result = system.order_client.create_order(request(99, 1, PaymentMethod::CashOnDelivery)).await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_illegal_transition_leaves_order_untouched() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 5).await;
        let receipt = system.order_client.create_order(request(mug.id, 1, PaymentMethod::CashOnDelivery)).await.unwrap();
        let order_id = receipt.order().unwrap().id;

        for event in [OrderEvent::Confirm, OrderEvent::Process, OrderEvent::Ship] {
            system.order_client.apply_order_event(order_id, event).await.unwrap();
        }
        let result = system.order_client.apply_order_event(order_id, OrderEvent::Confirm).await;
        assert!(matches!(result, Err(OrderError::IllegalTransition(_))));
        assert_eq!(system.order_client.fetch_order(order_id).await.unwrap().status, OrderStatus::Shipped);
        assert!(system.aggregator.is_empty());
    }

    #[tokio::test]
    async fn test_bank_transfer_is_promoted_when_payment_settles() {
        let provider = Arc::new(ScriptedPaymentProvider::new());
        provider.push_status(Ok(ProviderStatus::Pending));
        provider.push_status(Ok(ProviderStatus::Success));
        let system = spawn_system(provider.clone());
        let mug = seed(&system, 5).await;

        let receipt = system.order_client.create_order(request(mug.id, 2, PaymentMethod::BankTransfer)).await.unwrap();
        let CheckoutReceipt::AwaitingPayment { draft, payment, payment_link, .. } = receipt else {
            panic!("bank transfer must wait for payment");
        };
        assert!(payment_link.ends_with(&draft.id.to_string()));
        assert_eq!(payment.provider_reference.as_deref(), Some(format!("ref-{}", draft.id).as_str()));
        assert_eq!(provider.links_created()[0].1, Decimal::new(21000, 2));

        let Promotion::Promoted(order_id) = wait_for_decision(&system, draft.id).await else {
            panic!("draft was not promoted");
        };
        let order = system.order_client.fetch_order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(system.payment_client.fetch_payment(payment.id).await.unwrap().status, PaymentStatus::Success);
        assert_eq!(cached_quantity(&system, mug.id).await, Some(3));
    }

    #[tokio::test]
    async fn test_cancelled_bank_transfer_returns_stock() {
        let provider = Arc::new(ScriptedPaymentProvider::new());
        provider.push_status(Ok(ProviderStatus::Canceled));
        let system = spawn_system(provider);
        let mug = seed(&system, 5).await;

        let receipt = system.order_client.create_order(request(mug.id, 2, PaymentMethod::BankTransfer)).await.unwrap();
        let draft_id = receipt.draft().id;
        assert_eq!(wait_for_decision(&system, draft_id).await, Promotion::Rejected);

        assert_eq!(cached_quantity(&system, mug.id).await, Some(5));
        let payment_id = system.draft_client.fetch_draft(draft_id).await.unwrap().payment_info_id.unwrap();
        let payment = system.payment_client.fetch_payment(payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Canceled);
        assert!(payment.cancellation_reason.is_some());

        let report = system.reconciliation().run_once().await.unwrap();
        assert_eq!(report.rejected_drafts, 1);
        assert!(report.applied_deltas.is_empty());
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_payment_link_failure_rolls_back_reservation() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::failing_links()));
        let mug = seed(&system, 5).await;

        let result = system.order_client.create_order(request(mug.id, 2, PaymentMethod::BankTransfer)).await;
        assert!(matches!(result, Err(OrderError::PaymentProvider(_))));
        assert_eq!(cached_quantity(&system, mug.id).await, Some(5));

        let decided = system.draft_client.decided_drafts().await.unwrap();
        assert_eq!(decided.len(), 1);
        assert_eq!(decided[0].promotion, Promotion::Rejected);
        let payment_id = decided[0].payment_info_id.unwrap();
        assert_eq!(system.payment_client.fetch_payment(payment_id).await.unwrap().status, PaymentStatus::Canceled);
        assert_eq!(system.watcher.active(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_order_returns_stock_through_the_aggregator() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 5).await;
        let receipt = system.order_client.create_order(request(mug.id, 5, PaymentMethod::CashOnDelivery)).await.unwrap();
        let order = receipt.order().unwrap().clone();
        system.reconciliation().run_once().await.unwrap();
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().quantity, 0);

        let cancelled = system.order_client.apply_order_event(order.id, OrderEvent::Cancel).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(system.aggregator.pending(), HashMap::from([(mug.id, 5)]));
        let payment_id = order.payment_info_id.unwrap();
        assert_eq!(system.payment_client.fetch_payment(payment_id).await.unwrap().status, PaymentStatus::Canceled);

        system.flusher().flush_once().await.unwrap();
        assert!(system.aggregator.is_empty());
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_admin_correction_lands_on_flush() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 5).await;
        system.order_client.create_order(request(mug.id, 1, PaymentMethod::CashOnDelivery)).await.unwrap();

        system.order_client.adjust_stock(mug.id, 3).await.unwrap();
        system.order_client.adjust_stock(mug.id, -1).await.unwrap();
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().quantity, 5);

        system.flusher().flush_once().await.unwrap();
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().quantity, 7);
        assert_eq!(cached_quantity(&system, mug.id).await, None);

        let missing = system.order_client.adjust_stock(99, 1).await;
        assert!(matches!(missing, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_legacy_order_is_promoted_by_the_consumer() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 5).await;

        let draft = system.order_client.submit_legacy(request(mug.id, 3, PaymentMethod::CashOnDelivery)).await.unwrap();
        let Promotion::Promoted(order_id) = wait_for_decision(&system, draft.id).await else {
            panic!("legacy draft was not promoted");
        };

        // The ack follows the cache invalidation
        for _ in 0..100 {
            if system.legacy_queue.unacked_len() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(system.legacy_queue.unacked_len(), 0);

        let order = system.order_client.fetch_order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().version, 2);

        // Cached stock rehydrates net of the legacy draft
        system.order_client.create_order(request(mug.id, 1, PaymentMethod::CashOnDelivery)).await.unwrap();
        assert_eq!(cached_quantity(&system, mug.id).await, Some(1));
    }

    #[tokio::test]
    async fn test_legacy_order_without_stock_is_discarded() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 1).await;

        let draft = system.order_client.submit_legacy(request(mug.id, 2, PaymentMethod::CashOnDelivery)).await.unwrap();
        let payment_id = draft.payment_info_id.unwrap();

        let mut discarded = false;
        for _ in 0..100 {
            if system.draft_client.get_draft(draft.id).await.unwrap().is_none() {
                discarded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(discarded, "dead-lettered draft was not discarded");
        assert_eq!(system.payment_client.fetch_payment(payment_id).await.unwrap().status, PaymentStatus::Canceled);
        assert!(system.draft_client.items_of(draft.id).await.unwrap().is_empty());
        assert_eq!(system.variant_client.fetch_variant(mug.id).await.unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_legacy_path_refuses_bank_transfer() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 5).await;
        let result = system.order_client.submit_legacy(request(mug.id, 1, PaymentMethod::BankTransfer)).await;
        assert!(matches!(result, Err(OrderError::Validation(_))));
        assert_eq!(system.legacy_queue.ready_len(), 0);
    }

    struct Checkout {
        orders: OrderClient,
        variants: VariantClient,
        drafts: DraftClient,
        cache: CacheClient,
        _bus: EventBus,
    }

    /// Live tables and cache around the given payment table.
    fn checkout_with_payments(payments: ResourceClient<PaymentInfo>) -> Checkout {
        let (variants, _) = spawn_table(10);
        let (drafts, _) = spawn_table(10);
        let (items, _) = spawn_table(10);
        let (orders, _) = spawn_table(10);
        let (cache_service, cache) = StockCacheService::new(10);
        tokio::spawn(cache_service.run());
        let (bus, events) = EventBus::new(10, 0);

        let variants = VariantClient::new(variants);
        let items = ItemClient::new(items);
        let drafts = DraftClient::new(drafts, items.clone());
        let orders = OrderClient::new(
            orders,
            OrderDependencies {
                items,
                drafts: drafts.clone(),
                variants: variants.clone(),
                payments: PaymentClient::new(payments),
                cache: cache.clone(),
                aggregator: Arc::new(StockAggregator::new()),
                provider: Arc::new(ScriptedPaymentProvider::new()),
                events,
                legacy_queue: LegacyQueue::new("orders.create", None),
            },
            CheckoutSettings { cache_ttl: Duration::from_secs(60), reservation_attempts: 3 },
        );
        Checkout { orders, variants, drafts, cache, _bus: bus }
    }

    #[tokio::test]
    async fn test_failed_link_attach_releases_reservation_on_reconcile() {
        let (payments, mut payment_rx) = create_mock_client::<PaymentInfo>(10);
        let checkout = checkout_with_payments(payments);
        let mug = checkout
            .variants
            .create_variant(VariantCreate {
                product_id: 1,
                product_name: "Stoneware mug".to_string(),
                image: "mug.png".to_string(),
                price: price(),
                quantity: 5,
            })
            .await
            .unwrap();

        let orders = checkout.orders.clone();
        let order_task =
            tokio::spawn(async move { orders.create_order(request(mug.id, 2, PaymentMethod::BankTransfer)).await });

        let (payload, responder) = expect_create(&mut payment_rx).await.expect("Expected Payment Create");
        responder
            .send(Ok(PaymentInfo {
                id: 1,
                amount: payload.amount,
                method: payload.method,
                status: PaymentStatus::Pending,
                payment_link: None,
                provider_reference: None,
                cancellation_reason: None,
            }))
            .unwrap();

        let (id, action, responder) = expect_action(&mut payment_rx).await.expect("Expected Payment Action");
        assert_eq!(id, 1);
        assert!(matches!(action, PaymentAction::AttachLink { .. }));
        responder.send(Err(StoreError::ActorDropped)).unwrap();

        let (id, action, responder) = expect_action(&mut payment_rx).await.expect("Expected Payment Action");
        assert_eq!(id, 1);
        assert!(matches!(action, PaymentAction::Apply { event: crate::domain::PaymentEvent::Cancel, .. }));
        responder
            .send(Ok(PaymentActionResult::Transitioned { from: PaymentStatus::Pending, to: PaymentStatus::Canceled }))
            .unwrap();

        let result = order_task.await.unwrap();
        assert!(matches!(result, Err(OrderError::Internal(_))));
        let decided = checkout.drafts.decided_drafts().await.unwrap();
        assert_eq!(decided.len(), 1);
        assert_eq!(decided[0].promotion, Promotion::Rejected);

        // The clean pass drops the decremented record; rehydration sees all units
        let job = ReconciliationJob::new(
            checkout.drafts.clone(),
            checkout.variants.clone(),
            checkout.cache.clone(),
            Duration::from_secs(60),
        );
        let report = job.run_once().await.unwrap();
        assert_eq!(report.rejected_drafts, 1);
        assert_eq!(checkout.cache.get_stock(mug.id).await.unwrap(), None);

        checkout.orders.hydrate(&[mug.id]).await.unwrap();
        let record = checkout.cache.get_stock(mug.id).await.unwrap().unwrap();
        assert_eq!(record.quantity, 5);
    }

    #[tokio::test]
    async fn test_capture_for_rejected_draft_is_refunded() {
        let system = spawn_system(Arc::new(ScriptedPaymentProvider::new()));
        let mug = seed(&system, 5).await;
        let receipt = system.order_client.create_order(request(mug.id, 2, PaymentMethod::BankTransfer)).await.unwrap();
        let CheckoutReceipt::AwaitingPayment { draft, payment, .. } = receipt else {
            panic!("bank transfer must wait for payment");
        };
        assert!(system.order_client.reject_draft(draft.id).await.unwrap());
        system.order_client.complete_payment(draft.id).await.unwrap();

        let payment = system.payment_client.fetch_payment(payment.id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Refund);
        let draft = system.draft_client.fetch_draft(draft.id).await.unwrap();
        assert_eq!(draft.promotion, Promotion::Rejected);
    }
}
