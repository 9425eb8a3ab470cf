use tracing::{debug, info, instrument};

use crate::actor_framework::ResourceClient;
use crate::domain::{PaymentCreate, PaymentEvent, PaymentInfo};
use crate::error::OrderError;
use crate::payment::PaymentLink;
use crate::payment_actor::{PaymentAction, PaymentActionResult};

/// Client for the payment info table.
#[derive(Clone)]
pub struct PaymentClient {
    inner: ResourceClient<PaymentInfo>,
}

crate::impl_basic_client!(PaymentClient, PaymentInfo, payment);

impl PaymentClient {
    #[instrument(skip(self))]
    pub async fn open(&self, payload: PaymentCreate) -> Result<PaymentInfo, OrderError> {
        debug!("Sending request");
        Ok(self.inner.create(payload).await?)
    }

    #[instrument(skip(self))]
    pub async fn attach_link(&self, payment_id: i64, link: PaymentLink) -> Result<(), OrderError> {
        let action = PaymentAction::AttachLink { link: link.link, reference: link.reference };
        self.inner.perform_action(payment_id, action).await?;
        Ok(())
    }

    /// Drives the payment state machine. Returns whether the status moved;
    /// re-delivering an outcome the payment already holds is a no-op.
    #[instrument(skip(self))]
    pub async fn apply(&self, payment_id: i64, event: PaymentEvent, reason: Option<String>) -> Result<bool, OrderError> {
        let result = self
            .inner
            .perform_action(payment_id, PaymentAction::Apply { event, reason })
            .await?;
        if let PaymentActionResult::Transitioned { from, to } = &result {
            if result.changed() {
                info!(%from, %to, "Payment status changed");
            }
        }
        Ok(result.changed())
    }
}
