use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::CacheError;

/// Generic type aliases for service communication
pub type ServiceResult<T, E> = std::result::Result<T, E>;
pub type ServiceResponse<T, E> = oneshot::Sender<ServiceResult<T, E>>;

/// Requests understood by the stock cache actor. Each variant carries its
/// parameters and a oneshot channel for the reply.
#[derive(Debug)]
pub enum CacheRequest {
    HGetAll {
        key: String,
        respond_to: ServiceResponse<Option<HashMap<String, String>>, CacheError>,
    },
    /// Replaces the whole hash and (re)arms its TTL. With `only_if_absent`
    /// a live entry is left alone. Replies whether the hash was written.
    HSet {
        key: String,
        fields: HashMap<String, String>,
        ttl: Duration,
        only_if_absent: bool,
        respond_to: ServiceResponse<bool, CacheError>,
    },
    Del {
        keys: Vec<String>,
        respond_to: ServiceResponse<usize, CacheError>,
    },
    /// Increments a numeric field of an existing hash; absent keys stay absent.
    HIncrBy {
        key: String,
        field: String,
        delta: i64,
        respond_to: ServiceResponse<Option<i64>, CacheError>,
    },
    EvalReservation {
        keys: Vec<String>,
        args: Vec<String>,
        respond_to: ServiceResponse<Vec<String>, CacheError>,
    },
    Shutdown,
    #[cfg(test)]
    Len {
        respond_to: ServiceResponse<usize, CacheError>,
    },
}
