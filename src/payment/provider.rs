use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// One line of the checkout page the provider renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLink {
    pub link: String,
    pub reference: String,
}

/// Status as reported by the provider. Anything other than `Pending` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Pending,
    Success,
    Canceled,
    Failed,
}

impl ProviderStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, ProviderStatus::Pending)
    }
}

/// External bank-transfer provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment_link(
        &self,
        order_code: i64,
        amount: Decimal,
        line_items: Vec<LineItem>,
    ) -> Result<PaymentLink, ProviderError>;

    async fn get_status(&self, reference: &str) -> Result<ProviderStatus, ProviderError>;
}
