use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::IllegalTransition;

/// Errors raised by the generic resource actors that back the durable store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Record rejected the operation: {0}")]
    Rejected(String),
    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict { id: String, expected: u64, actual: u64 },
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
    #[error("Actor closed")]
    ActorClosed,
    #[error("Actor dropped the response")]
    ActorDropped,
}

/// Errors raised by the stock cache actor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed script reply: {0}")]
    Script(String),
}

/// Errors returned by the external payment provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),
    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),
}

/// Errors of the legacy message queue.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueueError {
    #[error("Message encoding failed: {0}")]
    Encode(String),
    #[error("Message decoding failed: {0}")]
    Decode(String),
    #[error("Unknown delivery tag {0}")]
    UnknownDelivery(u64),
}

/// Client-facing errors of the order pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Insufficient stock for variant {variant_id}")]
    InsufficientStock { variant_id: i64 },
    #[error("Submitted price does not match current price of variant {variant_id}")]
    InvalidPrice { variant_id: i64 },
    #[error("Submitted total does not match computed subtotal {computed}")]
    InvalidTotal { computed: Decimal },
    #[error("Version conflict: {0}")]
    VersionConflict(String),
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
    #[error("Order validation error: {0}")]
    Validation(String),
    #[error("Payment provider error: {0}")]
    PaymentProvider(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrderError {
    /// Only optimistic-lock conflicts and infrastructure failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::VersionConflict(_) | OrderError::Internal(_))
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => OrderError::NotFound(what),
            StoreError::VersionConflict { .. } => OrderError::VersionConflict(err.to_string()),
            StoreError::IllegalTransition(t) => OrderError::IllegalTransition(t),
            StoreError::Rejected(_) | StoreError::ActorClosed | StoreError::ActorDropped => {
                OrderError::Internal(err.to_string())
            }
        }
    }
}

impl From<CacheError> for OrderError {
    fn from(err: CacheError) -> Self {
        OrderError::Internal(err.to_string())
    }
}

impl From<ProviderError> for OrderError {
    fn from(err: ProviderError) -> Self {
        OrderError::PaymentProvider(err.to_string())
    }
}

impl From<QueueError> for OrderError {
    fn from(err: QueueError) -> Self {
        OrderError::Internal(err.to_string())
    }
}
