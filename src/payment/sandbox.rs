use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::provider::{LineItem, PaymentLink, PaymentProvider, ProviderStatus};
use crate::error::ProviderError;

struct SandboxPayment {
    status: ProviderStatus,
    polls: u32,
}

/// In-process stand-in for the bank provider. Payments stay pending until
/// settled by hand, or settle as successful after `auto_settle_after` polls.
pub struct SandboxProvider {
    payments: Mutex<HashMap<String, SandboxPayment>>,
    next_reference: AtomicU64,
    auto_settle_after: Option<u32>,
}

impl SandboxProvider {
    pub fn new() -> Self {
        Self {
            payments: Mutex::new(HashMap::new()),
            next_reference: AtomicU64::new(1),
            auto_settle_after: None,
        }
    }

    pub fn settling_after(polls: u32) -> Self {
        Self {
            auto_settle_after: Some(polls),
            ..Self::new()
        }
    }

    /// Forces the final status of a payment, as the bank would after the payer acts.
    pub fn settle(&self, reference: &str, status: ProviderStatus) -> Result<(), ProviderError> {
        let mut payments = self.payments.lock();
        let payment = payments
            .get_mut(reference)
            .ok_or_else(|| ProviderError::Rejected(format!("unknown reference {}", reference)))?;
        payment.status = status;
        info!(reference, ?status, "Sandbox payment settled");
        Ok(())
    }
}

impl Default for SandboxProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProvider for SandboxProvider {
    async fn create_payment_link(
        &self,
        order_code: i64,
        amount: Decimal,
        line_items: Vec<LineItem>,
    ) -> Result<PaymentLink, ProviderError> {
        if amount <= Decimal::ZERO || line_items.is_empty() {
            return Err(ProviderError::Rejected(format!("nothing to pay for order {}", order_code)));
        }
        let reference = format!("SBX-{}-{}", order_code, self.next_reference.fetch_add(1, Ordering::SeqCst));
        self.payments.lock().insert(
            reference.clone(),
            SandboxPayment { status: ProviderStatus::Pending, polls: 0 },
        );
        debug!(order_code, %amount, "Sandbox link created");
        Ok(PaymentLink {
            link: format!("https://sandbox.pay.local/checkout/{}", reference),
            reference,
        })
    }

    async fn get_status(&self, reference: &str) -> Result<ProviderStatus, ProviderError> {
        let mut payments = self.payments.lock();
        let payment = payments
            .get_mut(reference)
            .ok_or_else(|| ProviderError::Rejected(format!("unknown reference {}", reference)))?;
        payment.polls += 1;
        if let Some(after) = self.auto_settle_after {
            if payment.status == ProviderStatus::Pending && payment.polls >= after {
                payment.status = ProviderStatus::Success;
            }
        }
        Ok(payment.status)
    }
}
