//! Content digests and hashing algorithm support
//!
//! Blobs in the content store are keyed by a [`ContentDigest`]: the hex value of
//! a hash over the file's bytes, tagged with the algorithm that produced it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{HubError, Result};

/// Supported hashing algorithms for content addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HashAlgorithm {
    /// SHA-256 (matches the digest the Hugging Face Hub reports for LFS files)
    SHA256,
    /// SHA3-256
    SHA3_256,
    /// BLAKE3 (fastest)
    BLAKE3,
}

impl HashAlgorithm {
    /// Get the expected length of the hash in bytes
    pub fn hash_length(&self) -> usize {
        match self {
            HashAlgorithm::SHA256 => 32,
            HashAlgorithm::SHA3_256 => 32,
            HashAlgorithm::BLAKE3 => 32,
        }
    }

    /// Directory name used for blobs hashed with this algorithm
    pub fn dir_name(&self) -> &'static str {
        match self {
            HashAlgorithm::SHA256 => "sha256",
            HashAlgorithm::SHA3_256 => "sha3_256",
            HashAlgorithm::BLAKE3 => "blake3",
        }
    }

    /// Get the expected length of the hash in hexadecimal characters
    pub fn hex_length(&self) -> usize {
        self.hash_length() * 2
    }

    /// Validate that a hash string has the correct length and alphabet for this algorithm
    pub fn validate_hash_format(&self, hash: &str) -> Result<()> {
        let expected_len = self.hex_length();
        if hash.len() != expected_len {
            return Err(HubError::InvalidDigest(format!(
                "expected {} hex characters for {}, got {}",
                expected_len,
                self,
                hash.len()
            )));
        }

        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HubError::InvalidDigest(
                "digest must be a hexadecimal string".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::SHA256 => write!(f, "SHA256"),
            HashAlgorithm::SHA3_256 => write!(f, "SHA3-256"),
            HashAlgorithm::BLAKE3 => write!(f, "BLAKE3"),
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::SHA256
    }
}

impl FromStr for HashAlgorithm {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "SHA256" | "SHA-256" => Ok(HashAlgorithm::SHA256),
            "SHA3-256" | "SHA3_256" => Ok(HashAlgorithm::SHA3_256),
            "BLAKE3" => Ok(HashAlgorithm::BLAKE3),
            _ => Err(HubError::invalid_value("hash algorithm", s)),
        }
    }
}

/// Digest of a blob's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest {
    /// The hashing algorithm used
    pub algorithm: HashAlgorithm,
    /// Lowercase hexadecimal hash value
    pub value: String,
}

impl ContentDigest {
    /// Create a digest, normalizing to lowercase and validating the format
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self> {
        let value = value.into().to_lowercase();
        algorithm.validate_hash_format(&value)?;
        Ok(Self { algorithm, value })
    }

    /// Build a digest from raw hash output
    pub fn from_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> Result<Self> {
        Self::new(algorithm, to_hex(bytes))
    }

    /// Hex value, used as the blob file name
    pub fn hex(&self) -> &str {
        &self.value
    }

    /// Whether a raw hash string matches this digest (case-insensitive)
    pub fn matches(&self, hash_value: &str) -> bool {
        self.value.eq_ignore_ascii_case(hash_value)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
