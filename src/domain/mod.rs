//! Business records of the checkout pipeline. Plain data, no actor concerns.

pub mod variant;
pub mod draft;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod order_status;
pub mod payment_status;
pub mod checkout;

pub use variant::*;
pub use draft::*;
pub use order::*;
pub use order_item::*;
pub use payment::*;
pub use order_status::*;
pub use payment_status::*;
pub use checkout::*;
