use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::domain::CheckoutRequest;
use crate::error::QueueError;

/// Body of a legacy order-creation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreationMessage {
    pub draft_id: i64,
    pub request: CheckoutRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub tag: u64,
    pub body: String,
    /// How many times this message has been handed out, this time included.
    pub attempts: u32,
}

impl Delivery {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        serde_json::from_str(&self.body).map_err(|e| QueueError::Decode(e.to_string()))
    }
}

struct Pending {
    body: String,
    attempts: u32,
}

struct QueueState {
    name: String,
    ready: Mutex<VecDeque<Pending>>,
    unacked: Mutex<HashMap<u64, Pending>>,
    notify: Notify,
    next_tag: AtomicU64,
    dead_letter: Option<LegacyQueue>,
}

/// In-memory at-least-once queue with explicit acknowledgement. Nacked
/// messages are either requeued or moved to the dead-letter queue.
#[derive(Clone)]
pub struct LegacyQueue {
    state: Arc<QueueState>,
}

impl LegacyQueue {
    pub fn new(name: impl Into<String>, dead_letter: Option<LegacyQueue>) -> Self {
        Self {
            state: Arc::new(QueueState {
                name: name.into(),
                ready: Mutex::new(VecDeque::new()),
                unacked: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                next_tag: AtomicU64::new(1),
                dead_letter,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    #[instrument(skip(self, message), fields(queue = %self.state.name))]
    pub fn publish<T: Serialize>(&self, message: &T) -> Result<(), QueueError> {
        let body = serde_json::to_string(message).map_err(|e| QueueError::Encode(e.to_string()))?;
        self.push(Pending { body, attempts: 0 });
        debug!("Message published");
        Ok(())
    }

    fn push(&self, pending: Pending) {
        self.state.ready.lock().push_back(pending);
        self.state.notify.notify_one();
    }

    pub fn try_receive(&self) -> Option<Delivery> {
        let mut pending = self.state.ready.lock().pop_front()?;
        pending.attempts += 1;
        let tag = self.state.next_tag.fetch_add(1, Ordering::SeqCst);
        let delivery = Delivery { tag, body: pending.body.clone(), attempts: pending.attempts };
        self.state.unacked.lock().insert(tag, pending);
        Some(delivery)
    }

    /// Waits for the next message, or `None` once `shutdown` fires.
    pub async fn receive(&self, shutdown: &CancellationToken) -> Option<Delivery> {
        loop {
            if let Some(delivery) = self.try_receive() {
                return Some(delivery);
            }
            tokio::select! {
                _ = self.state.notify.notified() => {}
                _ = shutdown.cancelled() => return None,
            }
        }
    }

    pub fn ack(&self, tag: u64) -> Result<(), QueueError> {
        self.state
            .unacked
            .lock()
            .remove(&tag)
            .map(|_| ())
            .ok_or(QueueError::UnknownDelivery(tag))
    }

    /// Negative acknowledgement. `requeue` puts the message back at the tail;
    /// otherwise it moves to the dead-letter queue, or is dropped without one.
    #[instrument(skip(self), fields(queue = %self.state.name))]
    pub fn nack(&self, tag: u64, requeue: bool) -> Result<(), QueueError> {
        let pending = self
            .state
            .unacked
            .lock()
            .remove(&tag)
            .ok_or(QueueError::UnknownDelivery(tag))?;

        if requeue {
            self.push(pending);
            return Ok(());
        }
        match &self.state.dead_letter {
            Some(dlq) => {
                debug!(dead_letter = dlq.name(), "Message dead-lettered");
                dlq.push(Pending { body: pending.body, attempts: 0 });
            }
            None => warn!("Message dropped, no dead-letter queue"),
        }
        Ok(())
    }

    pub fn ready_len(&self) -> usize {
        self.state.ready.lock().len()
    }

    pub fn unacked_len(&self) -> usize {
        self.state.unacked.lock().len()
    }
}
