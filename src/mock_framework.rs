//! # Mock Framework
//!
//! Utilities for testing clients in isolation.
//!
//! Use [`create_mock_client`] to get a client and a receiver, then helpers
//! like [`expect_create`] or [`expect_action`] to assert what the client sent
//! and answer in place of the actor. [`ScriptedPaymentProvider`] stands in for
//! the bank provider.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::actor_framework::{Entity, Predicate, ResourceClient, ResourceRequest};
use crate::app_system::OrderSystem;
use crate::config::Config;
use crate::error::{ProviderError, StoreError};
use crate::payment::{LineItem, PaymentLink, PaymentProvider, ProviderStatus};

pub type Responder<R> = oneshot::Sender<Result<R, StoreError>>;

/// Creates a client whose requests land on the returned receiver instead of
/// a running `ResourceActor`.
pub fn create_mock_client<T: Entity>(buffer_size: usize) -> (ResourceClient<T>, mpsc::Receiver<ResourceRequest<T>>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (ResourceClient::new(sender), receiver)
}

/// Helper to verify that the next message is a Create request
pub async fn expect_create<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::CreatePayload, Responder<T>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Create { payload, respond_to }) => Some((payload, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Get request
pub async fn expect_get<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::Id, Responder<Option<T>>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Get { id, respond_to }) => Some((id, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is an Action request
pub async fn expect_action<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::Id, T::Action, Responder<T::ActionResult>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Action { id, action, respond_to }) => Some((id, action, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a BatchAction request
pub async fn expect_batch<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(Vec<(T::Id, T::Action)>, Responder<Vec<T::ActionResult>>)> {
    match receiver.recv().await {
        Some(ResourceRequest::BatchAction { actions, respond_to }) => Some((actions, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Query request
pub async fn expect_query<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(Predicate<T>, Responder<Vec<T>>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Query { filter, respond_to }) => Some((filter, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a DeleteWhere request
pub async fn expect_delete_where<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(Predicate<T>, Responder<Vec<T>>)> {
    match receiver.recv().await {
        Some(ResourceRequest::DeleteWhere { filter, respond_to }) => Some((filter, respond_to)),
        _ => None,
    }
}

/// Provider double: link creation can be made to fail, and status queries
/// replay a script. Once the script runs dry every query reports `Pending`.
#[derive(Default)]
pub struct ScriptedPaymentProvider {
    fail_links: bool,
    statuses: Mutex<VecDeque<Result<ProviderStatus, ProviderError>>>,
    links: Mutex<Vec<(i64, Decimal, Vec<LineItem>)>>,
}

impl ScriptedPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_links() -> Self {
        Self { fail_links: true, ..Self::default() }
    }

    pub fn push_status(&self, status: Result<ProviderStatus, ProviderError>) {
        self.statuses.lock().push_back(status);
    }

    pub fn links_created(&self) -> Vec<(i64, Decimal, Vec<LineItem>)> {
        self.links.lock().clone()
    }
}

#[async_trait]
impl PaymentProvider for ScriptedPaymentProvider {
    async fn create_payment_link(
        &self,
        order_code: i64,
        amount: Decimal,
        line_items: Vec<LineItem>,
    ) -> Result<PaymentLink, ProviderError> {
        if self.fail_links {
            return Err(ProviderError::Unavailable("provider down".to_string()));
        }
        self.links.lock().push((order_code, amount, line_items));
        Ok(PaymentLink {
            link: format!("https://pay.test/{}", order_code),
            reference: format!("ref-{}", order_code),
        })
    }

    async fn get_status(&self, _reference: &str) -> Result<ProviderStatus, ProviderError> {
        self.statuses.lock().pop_front().unwrap_or(Ok(ProviderStatus::Pending))
    }
}

/// Configuration for tests: background ticks far apart so tests drive
/// reconciliation and flushing by hand, fast payment polling.
pub fn test_config() -> Config {
    Config {
        aggregator_flush_interval: Duration::from_secs(3600),
        reconcile_interval: Duration::from_secs(3600),
        payment_poll_interval: Duration::from_millis(20),
        ..Config::default()
    }
}

pub fn spawn_system(provider: Arc<dyn PaymentProvider>) -> OrderSystem {
    OrderSystem::new(test_config(), provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{DraftClient, ItemClient, VariantClient};
    use crate::domain::{DraftOrder, OrderItem, ProductVariant, Promotion, VariantCreate};
    use crate::draft_actor::{DraftAction, DraftActionResult};
    use crate::variant_actor::{VariantAction, VariantActionResult};
    use std::collections::HashMap;

    fn variant(id: i64) -> ProductVariant {
        ProductVariant {
            id,
            product_id: 1,
            product_name: "Mug".into(),
            image: "mug.png".into(),
            price: Decimal::from(10),
            quantity: 4,
            version: 1,
            settled_drafts: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_mock_client() {
        let (client, mut receiver) = create_mock_client::<ProductVariant>(10);
        let client = VariantClient::new(client);

        let create_task = tokio::spawn(async move {
            client
                .create_variant(VariantCreate {
                    product_id: 1,
                    product_name: "Mug".into(),
                    image: "mug.png".into(),
                    price: Decimal::from(10),
                    quantity: 4,
                })
                .await
        });

        let (payload, responder) = expect_create(&mut receiver).await.expect("Expected Create request");
        assert_eq!(payload.product_name, "Mug");
        responder.send(Ok(variant(1))).unwrap();

        let result = create_task.await.unwrap();
        assert_eq!(result, Ok(variant(1)));
    }

    #[tokio::test]
    async fn test_deltas_travel_as_one_sorted_batch() {
        let (client, mut receiver) = create_mock_client::<ProductVariant>(10);
        let client = VariantClient::new(client);

        let task = tokio::spawn(async move { client.apply_deltas(&HashMap::from([(9, 2), (3, -1)])).await });

        let (actions, responder) = expect_batch(&mut receiver).await.expect("Expected BatchAction request");
        let ids: Vec<i64> = actions.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![3, 9]);
        assert!(matches!(actions[0].1, VariantAction::AdjustQuantity(-1)));
        responder
            .send(Ok(vec![
                VariantActionResult::Adjusted { quantity: 3 },
                VariantActionResult::Adjusted { quantity: 6 },
            ]))
            .unwrap();

        assert_eq!(task.await.unwrap().unwrap(), HashMap::from([(3, 3), (9, 6)]));
    }

    #[tokio::test]
    async fn test_draft_decision_round_trip() {
        let (drafts, mut draft_rx) = create_mock_client::<DraftOrder>(10);
        let (items, _item_rx) = create_mock_client::<OrderItem>(10);
        let client = DraftClient::new(drafts, ItemClient::new(items));

        let lookup = client.clone();
        let task = tokio::spawn(async move {
            let decided = client.decide(4, Promotion::Rejected).await?;
            let missing = lookup.get_draft(5).await?;
            Ok::<_, crate::error::OrderError>((decided, missing))
        });

        let (id, action, responder) = expect_action(&mut draft_rx).await.expect("Expected Draft Action");
        assert_eq!(id, 4);
        assert!(matches!(action, DraftAction::Decide(Promotion::Rejected)));
        responder
            .send(Ok(DraftActionResult::Decided { promotion: Promotion::Rejected, changed: true }))
            .unwrap();

        let (id, responder) = expect_get(&mut draft_rx).await.expect("Expected Draft Get");
        assert_eq!(id, 5);
        responder.send(Ok(None)).unwrap();

        assert_eq!(task.await.unwrap(), Ok((true, None)));
    }
}
