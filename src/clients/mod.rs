//! Typed client handles over the actors. Table clients wrap a
//! `ResourceClient`; `OrderClient` orchestrates the checkout flow.

#[macro_use]
pub mod macros;
pub mod variant_client;
pub mod item_client;
pub mod draft_client;
pub mod payment_client;
pub mod order_client;
mod order_lifecycle;

pub use variant_client::*;
pub use item_client::*;
pub use draft_client::*;
pub use payment_client::*;
pub use order_client::*;
