//! # Randmint Oracle
//!
//! The two halves of the oracle conversation: [`OracleClient`] submits
//! requests, [`CallbackReceiver`] accepts deliveries. [`MockCoordinator`]
//! stands in for a real oracle on local networks.

pub mod callback;
pub mod client;
pub mod fees;
pub mod mock;
pub mod protocol;
pub mod transport;

pub use callback::{CallbackReceiver, DeliveryOutcome};
pub use client::OracleClient;
pub use fees::FeeAccount;
pub use mock::{MockConfig, MockCoordinator};
pub use protocol::{OracleAck, OracleMessage, OracleRequest};
pub use transport::OracleTransport;
