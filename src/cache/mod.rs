//! Low-latency stock cache: a hash-with-TTL store run as an actor, plus the
//! atomic reservation script evaluated inside it.

pub mod stock_record;
pub mod reservation;
pub mod service;

pub use stock_record::*;
pub use reservation::*;
pub use service::*;
