use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::provider::{PaymentProvider, ProviderStatus};
use crate::error::OrderError;
use crate::events::{DomainEvent, EventHandler, PaymentCreated};

/// Where the watcher reports a final provider outcome.
#[async_trait]
pub trait PaymentOutcomes: Send + Sync {
    async fn complete_payment(&self, draft_id: i64) -> Result<(), OrderError>;
    async fn fail_payment(&self, draft_id: i64, reason: String) -> Result<(), OrderError>;
}

struct Watch {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<i64, Watch>>>;

/// One polling task per pending bank payment, keyed by draft id.
pub struct PaymentWatcher {
    provider: Arc<dyn PaymentProvider>,
    outcomes: Arc<dyn PaymentOutcomes>,
    interval: Duration,
    watches: Registry,
    shutdown: CancellationToken,
}

impl PaymentWatcher {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        outcomes: Arc<dyn PaymentOutcomes>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            provider,
            outcomes,
            interval,
            watches: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    /// Starts polling `reference` for `draft_id`. Returns false if the draft is
    /// already watched or the watcher is shutting down.
    #[instrument(skip(self))]
    pub fn watch(&self, draft_id: i64, reference: String) -> bool {
        if self.shutdown.is_cancelled() {
            warn!("Watcher shutting down, not watching");
            return false;
        }
        let mut watches = self.watches.lock();
        if watches.contains_key(&draft_id) {
            debug!("Draft already watched");
            return false;
        }

        let token = self.shutdown.child_token();
        let poll = PollLoop {
            draft_id,
            reference,
            provider: self.provider.clone(),
            outcomes: self.outcomes.clone(),
            interval: self.interval,
            token: token.clone(),
            watches: self.watches.clone(),
        };
        // The registry lock is still held, so the task cannot deregister
        // before it is registered.
        let handle = tokio::spawn(poll.run().instrument(tracing::info_span!("payment_watch", draft_id)));
        watches.insert(draft_id, Watch { token, handle });
        info!("Payment watch started");
        true
    }

    /// Stops the watch for one draft without touching its payment.
    pub fn cancel(&self, draft_id: i64) -> bool {
        match self.watches.lock().remove(&draft_id) {
            Some(watch) => {
                watch.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, draft_id: i64) -> bool {
        self.watches.lock().contains_key(&draft_id)
    }

    pub fn active(&self) -> usize {
        self.watches.lock().len()
    }

    /// Cancels every watch and waits for the tasks to finish.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let watches: Vec<(i64, Watch)> = self.watches.lock().drain().collect();
        info!(count = watches.len(), "Stopping payment watches");
        for (draft_id, watch) in watches {
            watch.token.cancel();
            if let Err(e) = watch.handle.await {
                error!(draft_id, error = ?e, "Payment watch task failed");
            }
        }
    }
}

#[async_trait]
impl EventHandler for PaymentWatcher {
    async fn handle(&self, event: &DomainEvent) -> Result<(), OrderError> {
        match event {
            DomainEvent::PaymentCreated(PaymentCreated { draft_id, reference, .. }) => {
                self.watch(*draft_id, reference.clone());
                Ok(())
            }
        }
    }
}

struct PollLoop {
    draft_id: i64,
    reference: String,
    provider: Arc<dyn PaymentProvider>,
    outcomes: Arc<dyn PaymentOutcomes>,
    interval: Duration,
    token: CancellationToken,
    watches: Registry,
}

impl PollLoop {
    async fn run(self) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    debug!("Payment watch cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
            if self.poll_once().await {
                break;
            }
        }
        self.watches.lock().remove(&self.draft_id);
        debug!("Payment watch finished");
    }

    /// Returns true once the payment reached a final outcome that was recorded.
    async fn poll_once(&self) -> bool {
        let status = match self.provider.get_status(&self.reference).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Provider status query failed, polling again");
                return false;
            }
        };

        let outcome = match status {
            ProviderStatus::Pending => return false,
            ProviderStatus::Success => self.outcomes.complete_payment(self.draft_id).await,
            ProviderStatus::Canceled | ProviderStatus::Failed => {
                let reason = format!("provider reported {:?}", status);
                self.outcomes.fail_payment(self.draft_id, reason).await
            }
        };

        match outcome {
            Ok(()) => {
                info!(?status, "Payment outcome recorded");
                true
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Recording payment outcome failed, retrying next tick");
                false
            }
            Err(e) => {
                error!(error = %e, "Payment outcome cannot be recorded, giving up");
                true
            }
        }
    }
}
