//! Bank-transfer side of checkout: the provider seam, a sandbox provider and
//! the background watchers polling it.

pub mod provider;
pub mod sandbox;
pub mod watcher;

pub use provider::*;
pub use sandbox::*;
pub use watcher::*;
