//! In-process event bus. Publishers hold a cheap [`EventPublisher`]; a single
//! subscriber receives every event at least once. Nothing survives a restart.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::OrderError;

/// A payment link was created for a bank-transfer draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCreated {
    pub draft_id: i64,
    pub payment_id: i64,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    PaymentCreated(PaymentCreated),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<(), OrderError>;
}

#[derive(Clone)]
pub struct EventPublisher {
    sender: mpsc::Sender<DomainEvent>,
}

impl EventPublisher {
    #[instrument(skip(self))]
    pub async fn publish(&self, event: DomainEvent) -> Result<(), OrderError> {
        debug!("Publishing event");
        self.sender
            .send(event)
            .await
            .map_err(|_| OrderError::Internal("event bus closed".to_string()))
    }
}

pub struct EventBus {
    receiver: mpsc::Receiver<DomainEvent>,
    handler: Option<Arc<dyn EventHandler>>,
    redeliveries: u32,
    backoff: Duration,
}

impl EventBus {
    pub fn new(buffer_size: usize, redeliveries: u32) -> (Self, EventPublisher) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let bus = Self {
            receiver,
            handler: None,
            redeliveries,
            backoff: Duration::from_millis(50),
        };
        (bus, EventPublisher { sender })
    }

    /// Installs the subscriber. A later call replaces the earlier one.
    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        if self.handler.replace(handler).is_some() {
            warn!("Event bus subscriber replaced");
        }
    }

    #[instrument(name = "event_bus", skip(self, shutdown))]
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Event bus starting");
        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(event) => self.deliver(event).await,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Event bus stopped");
    }

    async fn deliver(&self, event: DomainEvent) {
        let Some(handler) = &self.handler else {
            warn!(?event, "No subscriber, event dropped");
            return;
        };

        let mut attempt = 0;
        loop {
            match handler.handle(&event).await {
                Ok(()) => return,
                Err(e) if attempt < self.redeliveries => {
                    attempt += 1;
                    warn!(?event, attempt, error = %e, "Handler failed, redelivering");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => {
                    error!(?event, error = %e, "Handler failed, giving up on event");
                    return;
                }
            }
        }
    }
}
