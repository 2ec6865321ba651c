//! # Randmint SDK
//!
//! Client SDK for interacting with randmint nodes.

pub mod client;

pub use client::{Finalize, RandmintClient};

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::client::{Finalize, RandmintClient};
    pub use randmint_core::prelude::*;
}
