//! Common types used across randmint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RandmintError, Result};

/// Maximum length of a subject identifier, in bytes.
pub const MAX_SUBJECT_LEN: usize = 128;

/// Opaque identifier of a randomness request.
///
/// Minted by the ledger when a record is created and handed to the oracle as
/// the correlation token for its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Mint a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RequestId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RequestId {
    type Err = RandmintError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| RandmintError::SerializationError(format!("bad request id '{}': {}", s, e)))
    }
}

/// Identifier of the entity the randomness is for (e.g. a token number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Validate and wrap a subject identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let invalid = |message: &str| RandmintError::InvalidSubject {
            subject: raw.clone(),
            message: message.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("subject cannot be empty"));
        }
        if raw.len() > MAX_SUBJECT_LEN {
            return Err(invalid("subject is too long"));
        }
        if !raw.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(invalid("subject must be printable ASCII without whitespace"));
        }

        Ok(Self(raw))
    }

    /// Subject for a sequential token number.
    pub fn token(number: u64) -> Self {
        Self(format!("token-{}", number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubjectId {
    type Error = RandmintError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<SubjectId> for String {
    fn from(subject: SubjectId) -> Self {
        subject.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Oracle key hash selecting which proving key services a request.
///
/// A `0x`-prefixed, 32-byte hex string, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyHash(String);

impl KeyHash {
    /// Validate and wrap a key hash.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        let hex = raw.strip_prefix("0x").ok_or_else(|| RandmintError::InvalidParams {
            message: format!("key hash '{}' must start with 0x", raw),
        })?;

        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RandmintError::InvalidParams {
                message: format!("key hash '{}' must be 32 bytes of hex", raw),
            });
        }

        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KeyHash {
    type Error = RandmintError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<KeyHash> for String {
    fn from(key_hash: KeyHash) -> Self {
        key_hash.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters chosen at request time. Immutable once a record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Fee paid to the oracle, in the smallest unit of the fee token.
    pub fee: u64,

    /// Oracle configuration servicing the request.
    pub key_hash: KeyHash,
}

impl StrategyParams {
    /// Create strategy parameters.
    pub fn new(fee: u64, key_hash: KeyHash) -> Self {
        Self { fee, key_hash }
    }

    /// Validate the parameters.
    pub fn validate(&self) -> Result<()> {
        if self.fee == 0 {
            return Err(RandmintError::InvalidParams {
                message: "fee must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Randomness delivered by the oracle.
///
/// Serialized as a decimal string so values above 2^53 survive JSON
/// consumers. Plain JSON integers are accepted on input up to `u64::MAX`;
/// larger values must be sent as decimal strings. Formats with native
/// 128-bit integers may send them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Randomness(pub u128);

impl Randomness {
    /// Big-endian byte representation.
    pub fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl From<u64> for Randomness {
    fn from(value: u64) -> Self {
        Self(value as u128)
    }
}

impl From<u128> for Randomness {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl fmt::Display for Randomness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Randomness {
    type Err = RandmintError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u128>()
            .map(Self)
            .map_err(|e| RandmintError::SerializationError(format!("bad randomness '{}': {}", s, e)))
    }
}

impl Serialize for Randomness {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Randomness {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RandomnessVisitor;

        impl serde::de::Visitor<'_> for RandomnessVisitor {
            type Value = Randomness;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an unsigned integer or decimal string")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<Randomness, E> {
                Ok(Randomness::from(v))
            }

            fn visit_u128<E: serde::de::Error>(self, v: u128) -> std::result::Result<Randomness, E> {
                Ok(Randomness(v))
            }

            // JSON integers above u64::MAX arrive here after losing precision.
            fn visit_f64<E: serde::de::Error>(self, _: f64) -> std::result::Result<Randomness, E> {
                Err(E::custom(
                    "randomness above u64::MAX must be sent as a decimal string",
                ))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Randomness, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(RandomnessVisitor)
    }
}

/// State of a randomness request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Record exists; the oracle has not acknowledged the submission yet.
    Created,
    /// The oracle acknowledged the request; waiting for the callback.
    RandomnessRequested,
    /// Randomness has been delivered.
    RandomnessFulfilled,
    /// The dependent computation finished.
    Completed,
    /// The request was rejected or cancelled.
    Failed,
}

impl RequestState {
    /// Position along the main chain. `Failed` sits beside the chain.
    pub fn rank(&self) -> u8 {
        match self {
            RequestState::Created => 0,
            RequestState::RandomnessRequested => 1,
            RequestState::RandomnessFulfilled => 2,
            RequestState::Completed => 3,
            RequestState::Failed => 3,
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }

    /// Returns true if the request is still in flight.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if `self -> to` is a legal move.
    pub fn can_transition_to(&self, to: RequestState) -> bool {
        matches!(
            (self, to),
            (RequestState::Created, RequestState::RandomnessRequested)
                | (RequestState::Created, RequestState::Failed)
                | (RequestState::RandomnessRequested, RequestState::RandomnessFulfilled)
                | (RequestState::RandomnessRequested, RequestState::Failed)
                | (RequestState::RandomnessFulfilled, RequestState::Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Created => "created",
            RequestState::RandomnessRequested => "randomness_requested",
            RequestState::RandomnessFulfilled => "randomness_fulfilled",
            RequestState::Completed => "completed",
            RequestState::Failed => "failed",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HASH: &str = "0x474e34a077df58807dbe9c96d3c009b23b3c6d0cce433e59bbf5b34f823bc56c";

    #[test]
    fn test_request_state_terminal() {
        assert!(RequestState::Completed.is_terminal());
        assert!(RequestState::Failed.is_terminal());
        assert!(!RequestState::RandomnessRequested.is_terminal());
        assert!(RequestState::Created.is_active());
    }

    #[test]
    fn test_request_state_transitions() {
        assert!(RequestState::Created.can_transition_to(RequestState::RandomnessRequested));
        assert!(RequestState::RandomnessRequested.can_transition_to(RequestState::RandomnessFulfilled));
        assert!(RequestState::RandomnessFulfilled.can_transition_to(RequestState::Completed));
        assert!(RequestState::RandomnessRequested.can_transition_to(RequestState::Failed));

        assert!(!RequestState::RandomnessRequested.can_transition_to(RequestState::Completed));
        assert!(!RequestState::Completed.can_transition_to(RequestState::Failed));
        assert!(!RequestState::RandomnessFulfilled.can_transition_to(RequestState::RandomnessRequested));
        assert!(!RequestState::Failed.can_transition_to(RequestState::RandomnessFulfilled));
    }

    #[test]
    fn test_subject_validation() {
        assert!(SubjectId::parse("token-1").is_ok());
        assert!(SubjectId::parse("").is_err());
        assert!(SubjectId::parse("token 1").is_err());
        assert!(SubjectId::parse("x".repeat(MAX_SUBJECT_LEN + 1)).is_err());
        assert_eq!(SubjectId::token(7).as_str(), "token-7");
    }

    #[test]
    fn test_key_hash_validation() {
        let key_hash = KeyHash::parse(KEY_HASH).unwrap();
        assert_eq!(key_hash.as_str(), KEY_HASH);

        assert!(KeyHash::parse("474e34a0").is_err());
        assert!(KeyHash::parse("0x1234").is_err());
        assert!(KeyHash::parse(format!("0x{}", "zz".repeat(32))).is_err());
    }

    #[test]
    fn test_strategy_params_validation() {
        let key_hash = KeyHash::parse(KEY_HASH).unwrap();
        assert!(StrategyParams::new(100, key_hash.clone()).validate().is_ok());
        assert!(StrategyParams::new(0, key_hash).validate().is_err());
    }

    #[test]
    fn test_randomness_serde() {
        let big = Randomness(u128::MAX);
        let json = serde_json::to_string(&big).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
        assert_eq!(serde_json::from_str::<Randomness>(&json).unwrap(), big);

        let small: Randomness = serde_json::from_str("77777").unwrap();
        assert_eq!(small, Randomness::from(77777u64));
        assert!(serde_json::from_str::<Randomness>("-1").is_err());
        assert!(serde_json::from_str::<Randomness>("\"abc\"").is_err());
    }

    #[test]
    fn test_randomness_wide_integers() {
        use serde::de::value::{Error as ValueError, U128Deserializer};
        use serde::de::IntoDeserializer;

        let native: U128Deserializer<ValueError> = u128::MAX.into_deserializer();
        assert_eq!(Randomness::deserialize(native).unwrap(), Randomness(u128::MAX));

        let err = serde_json::from_str::<Randomness>(&u128::MAX.to_string()).unwrap_err();
        assert!(err.to_string().contains("decimal string"));
    }

    #[test]
    fn test_subject_rejected_during_deserialization() {
        let result: std::result::Result<SubjectId, _> = serde_json::from_str("\"has space\"");
        assert!(result.is_err());
    }
}
