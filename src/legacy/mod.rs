//! Message-driven fallback for order creation, with retries and a
//! dead-letter queue whose consumer undoes the staged draft.

pub mod queue;
pub mod consumer;

pub use queue::*;
pub use consumer::*;
