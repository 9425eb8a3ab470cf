//! Variant table: durable quantities, prices and row versions.

mod actions;
pub mod entity;

pub use actions::*;
