//! Domain layer - Array entities and the port the reconciler talks through
//!
//! Adapters in [`crate::array`] implement [`ports::ArrayClient`].

pub mod entities;
pub mod ports;

pub use entities::*;
pub use ports::*;
