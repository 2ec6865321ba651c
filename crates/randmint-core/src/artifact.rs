//! Artifact types for randmint.
//!
//! An [`Artifact`] is the result of the deterministic computation that consumes
//! delivered randomness. The computation itself belongs to an external
//! collaborator behind [`ArtifactComputer`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::Randomness;

/// Number of derived words produced by [`DigestComputer`] by default.
pub const DEFAULT_WORD_COUNT: usize = 8;

/// Output of completing a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// The randomness the artifact was computed from.
    pub randomness: Randomness,

    /// Hex SHA-256 digest of the artifact content.
    pub digest: String,

    /// Content produced by the computer.
    pub content: serde_json::Value,
}

impl Artifact {
    /// Build an artifact, deriving the digest from the content.
    pub fn new(randomness: Randomness, content: serde_json::Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(randomness.to_be_bytes());
        hasher.update(content.to_string().as_bytes());
        Self {
            randomness,
            digest: hex_encode(hasher.finalize()),
            content,
        }
    }

    /// Check that the digest matches the content.
    pub fn verify_digest(&self) -> bool {
        Artifact::new(self.randomness, self.content.clone()).digest == self.digest
    }
}

/// Pure, deterministic computation turning randomness into an artifact.
pub trait ArtifactComputer: Send + Sync {
    fn compute(&self, randomness: Randomness) -> Artifact;
}

/// Default computer: expands the randomness into derived words.
#[derive(Debug, Clone)]
pub struct DigestComputer {
    words: usize,
}

impl DigestComputer {
    pub fn new(words: usize) -> Self {
        Self { words }
    }
}

impl Default for DigestComputer {
    fn default() -> Self {
        Self::new(DEFAULT_WORD_COUNT)
    }
}

impl ArtifactComputer for DigestComputer {
    fn compute(&self, randomness: Randomness) -> Artifact {
        let words = expand(randomness, self.words);
        Artifact::new(randomness, serde_json::json!({ "words": words }))
    }
}

/// Expand one random value into `n` derived values.
///
/// `word[i] = first 8 bytes of SHA-256(randomness_be || i_be)`.
pub fn expand(randomness: Randomness, n: usize) -> Vec<u64> {
    (0..n as u64)
        .map(|i| {
            let mut hasher = Sha256::new();
            hasher.update(randomness.to_be_bytes());
            hasher.update(i.to_be_bytes());
            let hash = hasher.finalize();
            let mut word = [0u8; 8];
            word.copy_from_slice(&hash[..8]);
            u64::from_be_bytes(word)
        })
        .collect()
}

fn hex_encode(bytes: impl AsRef<[u8]>) -> String {
    bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
}
