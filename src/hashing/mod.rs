//! Content fingerprinting for exact-duplicate detection.
//!
//! Fingerprints are lowercase hex SHA-256 digests of the raw item bytes. No
//! normalisation is applied: two items share a fingerprint only when their
//! bytes are identical.

use std::io::Read;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Chunk size used when hashing from a reader.
const READ_CHUNK_SIZE: usize = 4096;

/// Length of the abbreviated fingerprint used in logs and tags.
const SHORT_LEN: usize = 16;

/// A content-addressed digest identifying exact content equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Full 64-character hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex characters of the digest.
    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN.min(self.0.len())]
    }

    /// Tag form `sha256:<short>`, used in manifests.
    pub fn to_tag(&self) -> String {
        format!("sha256:{}", self.short())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 content hasher.
pub struct ContentHasher;

impl ContentHasher {
    /// Fingerprints an in-memory buffer.
    #[must_use]
    pub fn hash_bytes(content: &[u8]) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Fingerprints a stream in fixed-size chunks.
    ///
    /// # Errors
    /// Propagates any read error from `reader`.
    pub fn hash_reader(mut reader: impl Read) -> std::io::Result<Fingerprint> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Fingerprint(hex::encode(hasher.finalize())))
    }
}
