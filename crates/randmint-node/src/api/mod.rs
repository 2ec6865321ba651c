//! HTTP API handlers.

pub mod callback;
pub mod error;
pub mod fees;
pub mod health;
pub mod request;
