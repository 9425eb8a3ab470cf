//! Transactional core of a marketplace checkout: atomic stock reservation
//! against a cache, draft staging, payment-driven promotion into durable
//! orders, and periodic reconciliation with the durable store.

pub mod actor_framework;
pub mod messages;
pub mod error;
pub mod domain;

pub mod variant_actor;
pub mod draft_actor;
pub mod order_actor;
pub mod payment_actor;

pub mod cache;
#[macro_use]
pub mod clients;
pub mod aggregator;
pub mod reconciliation;
pub mod events;
pub mod payment;
pub mod legacy;

pub mod config;
pub mod app_system;

#[cfg(test)]
mod mock_framework;
#[cfg(test)]
mod integration_tests;
