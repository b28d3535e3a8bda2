//! Content addressing with self-describing (multihash) digests
//!
//! A [`ContentHash`] is encoded as `<algorithm code><digest length><digest>`
//! and rendered as lowercase hex, so `sha2-256` hashes always start with
//! `1220`. The algorithm tag travels with every key, which lets the store
//! switch algorithms without invalidating objects written under the old one.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

use crate::error::DocstoreError;

/// Supported digest algorithms, tagged with their multicodec code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HashAlgorithm {
    #[default]
    #[serde(rename = "sha2-256")]
    Sha256,
    #[serde(rename = "sha2-512")]
    Sha512,
}

impl HashAlgorithm {
    /// Multicodec code for the algorithm
    pub fn code(&self) -> u8 {
        match self {
            HashAlgorithm::Sha256 => 0x12,
            HashAlgorithm::Sha512 => 0x13,
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha2-256",
            HashAlgorithm::Sha512 => "sha2-512",
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0x12 => Some(HashAlgorithm::Sha256),
            0x13 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = DocstoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha2-256" | "sha256" => Ok(HashAlgorithm::Sha256),
            "sha2-512" | "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(DocstoreError::InvalidHash(format!(
                "unsupported hash algorithm '{}'",
                other
            ))),
        }
    }
}

/// Self-describing content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl ContentHash {
    /// Hash `content` with the given algorithm
    pub fn compute(algorithm: HashAlgorithm, content: &[u8]) -> Self {
        let mut hasher = ContentHasher::new(algorithm);
        hasher.update(content);
        hasher.finalize()
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Multihash bytes: code, length, digest
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.digest.len());
        bytes.push(self.algorithm.code());
        bytes.push(self.digest.len() as u8);
        bytes.extend_from_slice(&self.digest);
        bytes
    }

    /// Decode multihash bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocstoreError> {
        let [code, len, digest @ ..] = bytes else {
            return Err(DocstoreError::InvalidHash("hash is too short".into()));
        };

        let algorithm = HashAlgorithm::from_code(*code).ok_or_else(|| {
            DocstoreError::InvalidHash(format!("unknown multihash code 0x{:02x}", code))
        })?;

        if *len as usize != algorithm.digest_len() || digest.len() != algorithm.digest_len() {
            return Err(DocstoreError::InvalidHash(format!(
                "{} digest must be {} bytes",
                algorithm.name(),
                algorithm.digest_len()
            )));
        }

        Ok(Self {
            algorithm,
            digest: digest.to_vec(),
        })
    }

    /// Lowercase hex encoding of the multihash bytes
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Verify content matches this hash
    pub fn verify(&self, content: &[u8]) -> bool {
        Self::compute(self.algorithm, content) == *self
    }

    /// Storage key for the content object
    /// Example: "blobs/1220abc123..."
    pub fn blob_key(&self) -> String {
        format!("blobs/{}", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = DocstoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
            return Err(DocstoreError::InvalidHash(format!(
                "'{}' is not lowercase hex",
                s
            )));
        }
        let bytes = hex::decode(s).map_err(|e| DocstoreError::InvalidHash(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DocstoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

/// Incremental hasher for streamed content
pub struct ContentHasher {
    inner: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let inner = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => HasherState::Sha512(Sha512::new()),
        };
        Self { inner }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match &mut self.inner {
            HasherState::Sha256(h) => h.update(chunk),
            HasherState::Sha512(h) => h.update(chunk),
        }
    }

    pub fn finalize(self) -> ContentHash {
        match self.inner {
            HasherState::Sha256(h) => ContentHash {
                algorithm: HashAlgorithm::Sha256,
                digest: h.finalize().to_vec(),
            },
            HasherState::Sha512(h) => ContentHash {
                algorithm: HashAlgorithm::Sha512,
                digest: h.finalize().to_vec(),
            },
        }
    }
}

/// Storage key for a metadata record
/// Example: "documents/doc_0190....json"
pub fn record_key(prefix: &str, id: &str) -> String {
    format!("{}/{}.json", prefix, id)
}

/// Storage key for an idempotency index entry
/// Example: "assemblies-index/<hex>.json"
pub fn index_key(prefix: &str, parts: &[&str]) -> String {
    // Hash the joined parts so arbitrary caller ids stay valid storage keys
    let joined = parts.join("\u{1f}");
    let digest = ContentHash::compute(HashAlgorithm::Sha256, joined.as_bytes());
    format!("{}-index/{}.json", prefix, hex::encode(digest.digest()))
}
