use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::reservation::{reserve_stock, ReservationOutcome, ReservationRequest, ScriptContext};
use super::stock_record::{stock_key, StockRecord, FIELD_QUANTITY};
use crate::error::CacheError;
use crate::messages::{CacheRequest, ServiceResponse};

struct CacheEntry {
    fields: HashMap<String, String>,
    expires_at: Instant,
}

/// Keyspace with lazy expiry. Expired entries read as missing and are
/// dropped on first touch.
#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, CacheEntry>,
}

impl Keyspace {
    fn live(&mut self, key: &str) -> Option<&mut CacheEntry> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.expires_at <= Instant::now(),
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }
}

impl ScriptContext for Keyspace {
    fn exists(&mut self, key: &str) -> bool {
        self.live(key).is_some()
    }

    fn hget(&mut self, key: &str, field: &str) -> Option<String> {
        self.live(key)?.fields.get(field).cloned()
    }

    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Option<i64> {
        let slot = self.live(key)?.fields.get_mut(field)?;
        let next = slot.parse::<i64>().ok()? + delta;
        *slot = next.to_string();
        Some(next)
    }
}

/// Stock cache actor. Processing one message at a time is what makes the
/// reservation script atomic: no other request can interleave with it.
pub struct StockCacheService {
    receiver: mpsc::Receiver<CacheRequest>,
    keyspace: Keyspace,
}

impl StockCacheService {
    pub fn new(buffer_size: usize) -> (Self, CacheClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let service = Self {
            receiver,
            keyspace: Keyspace::default(),
        };
        (service, CacheClient::new(sender))
    }

    #[instrument(name = "stock_cache", skip(self))]
    pub async fn run(mut self) {
        info!("StockCacheService starting");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                CacheRequest::HGetAll { key, respond_to } => {
                    let fields = self.keyspace.live(&key).map(|entry| entry.fields.clone());
                    let _ = respond_to.send(Ok(fields));
                }
                CacheRequest::HSet { key, fields, ttl, only_if_absent, respond_to } => {
                    if only_if_absent && self.keyspace.live(&key).is_some() {
                        let _ = respond_to.send(Ok(false));
                        continue;
                    }
                    let expires_at = Instant::now() + ttl;
                    self.keyspace.entries.insert(key, CacheEntry { fields, expires_at });
                    let _ = respond_to.send(Ok(true));
                }
                CacheRequest::Del { keys, respond_to } => {
                    let removed = keys.iter().filter(|key| self.keyspace.entries.remove(*key).is_some()).count();
                    debug!(removed, "Deleted cache keys");
                    let _ = respond_to.send(Ok(removed));
                }
                CacheRequest::HIncrBy { key, field, delta, respond_to } => {
                    let _ = respond_to.send(Ok(self.keyspace.hincrby(&key, &field, delta)));
                }
                CacheRequest::EvalReservation { keys, args, respond_to } => {
                    self.handle_eval_reservation(keys, args, respond_to);
                }
                CacheRequest::Shutdown => {
                    info!("StockCacheService shutting down");
                    break;
                }
                #[cfg(test)]
                CacheRequest::Len { respond_to } => {
                    let _ = respond_to.send(Ok(self.keyspace.entries.len()));
                }
            }
        }

        info!("StockCacheService stopped");
    }

    #[instrument(fields(keys = keys.len()), skip(self, keys, args, respond_to))]
    fn handle_eval_reservation(
        &mut self,
        keys: Vec<String>,
        args: Vec<String>,
        respond_to: ServiceResponse<Vec<String>, CacheError>,
    ) {
        let reply = reserve_stock(&mut self.keyspace, &keys, &args);
        debug!(status = %reply.first().map(String::as_str).unwrap_or(""), "Reservation script finished");
        let _ = respond_to.send(Ok(reply));
    }
}

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone)]
pub struct CacheClient {
    sender: mpsc::Sender<CacheRequest>,
}

impl CacheClient {
    pub fn new(sender: mpsc::Sender<CacheRequest>) -> Self {
        Self { sender }
    }

    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), CacheError> {
        debug!("Sending shutdown request");
        self.sender
            .send(CacheRequest::Shutdown)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_stock(&self, variant_id: i64) -> Result<Option<StockRecord>, CacheError> {
        match self.hgetall(stock_key(variant_id)).await? {
            Some(fields) => StockRecord::from_fields(&fields).map(Some),
            None => Ok(None),
        }
    }

    #[instrument(fields(variant_id = record.variant_id, quantity = record.quantity), skip(self, record))]
    pub async fn put_stock(&self, record: &StockRecord, ttl: Duration) -> Result<(), CacheError> {
        self.hset(record.key(), record.to_fields(), ttl, false).await.map(|_| ())
    }

    /// Writes a freshly hydrated record unless a live one appeared meanwhile,
    /// so a slow hydration never overwrites stock another request reserved.
    #[instrument(fields(variant_id = record.variant_id, quantity = record.quantity), skip(self, record))]
    pub async fn seed_stock(&self, record: &StockRecord, ttl: Duration) -> Result<bool, CacheError> {
        self.hset(record.key(), record.to_fields(), ttl, true).await
    }

    /// Drops cached records so the next read rehydrates from the durable store.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, variant_ids: Vec<i64>) -> Result<usize, CacheError> {
        if variant_ids.is_empty() {
            return Ok(0);
        }
        self.del(variant_ids.into_iter().map(stock_key).collect()).await
    }

    /// Puts reserved units back. A missing record needs nothing: hydration
    /// recomputes availability from the durable store.
    #[instrument(skip(self))]
    pub async fn restore_stock(&self, variant_id: i64, quantity: i64) -> Result<Option<i64>, CacheError> {
        let restored = self
            .hincrby(stock_key(variant_id), FIELD_QUANTITY.to_string(), quantity)
            .await?;
        if restored.is_none() {
            warn!("No cached record to restore into");
        }
        Ok(restored)
    }

    #[instrument(fields(lines = request.lines.len(), subtotal = %request.expected_subtotal), skip(self, request))]
    pub async fn reserve(&self, request: &ReservationRequest) -> Result<ReservationOutcome, CacheError> {
        let reply = self.eval_reservation(request.keys(), request.args()).await?;
        ReservationOutcome::parse(reply)
    }
}

crate::client_method!(CacheClient => fn hgetall(key: String) -> Option<HashMap<String, String>> as CacheRequest::HGetAll, Error = CacheError::Unavailable);
crate::client_method!(CacheClient => fn hset(key: String, fields: HashMap<String, String>, ttl: Duration, only_if_absent: bool) -> bool as CacheRequest::HSet, Error = CacheError::Unavailable);
crate::client_method!(CacheClient => fn del(keys: Vec<String>) -> usize as CacheRequest::Del, Error = CacheError::Unavailable);
crate::client_method!(CacheClient => fn hincrby(key: String, field: String, delta: i64) -> Option<i64> as CacheRequest::HIncrBy, Error = CacheError::Unavailable);
crate::client_method!(CacheClient => fn eval_reservation(keys: Vec<String>, args: Vec<String>) -> Vec<String> as CacheRequest::EvalReservation, Error = CacheError::Unavailable);

#[cfg(test)]
crate::client_method!(CacheClient => fn len() -> usize as CacheRequest::Len, Error = CacheError::Unavailable);
