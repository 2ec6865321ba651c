//! Outbound channel to the randomness oracle.

use async_trait::async_trait;
use randmint_core::Result;

use crate::protocol::{OracleAck, OracleRequest};

/// Submits requests to an oracle.
///
/// An `Ok` acknowledgement means the oracle has accepted the request and will
/// eventually deliver randomness for `request.id`. Any error means it will not;
/// implementations should map refusals to
/// [`RandmintError::SubmissionRejected`](randmint_core::RandmintError::SubmissionRejected).
#[async_trait]
pub trait OracleTransport: Send + Sync {
    async fn submit_request(&self, request: &OracleRequest) -> Result<OracleAck>;
}
