//! Durable order table and the item table shared by drafts and orders.

mod actions;
pub mod entity;
pub mod item_entity;

pub use actions::*;
