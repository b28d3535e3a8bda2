//! Store configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::address::HashAlgorithm;
use crate::error::{DocstoreError, Result};
use crate::storage::validate_bucket;

/// Which object storage backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[serde(rename = "fs")]
    FileSystem,
    S3,
}

impl FromStr for BackendKind {
    type Err = DocstoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "fs" | "filesystem" | "file" => Ok(BackendKind::FileSystem),
            "s3" => Ok(BackendKind::S3),
            other => Err(DocstoreError::Config(format!(
                "Unknown backend '{}', expected memory, fs or s3",
                other
            ))),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendKind,

    /// Root directory for the filesystem backend
    pub root_path: PathBuf,

    /// Bucket holding content objects
    pub content_bucket: String,

    /// Bucket holding metadata records
    pub metadata_bucket: String,

    /// Digest used for new content
    pub hash_algorithm: HashAlgorithm,
}

impl StoreConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            backend: match var("DOCSTORE_BACKEND") {
                Some(value) => value.parse()?,
                None => defaults.backend,
            },
            root_path: var("DOCSTORE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root_path),
            content_bucket: var("DOCSTORE_CONTENT_BUCKET").unwrap_or(defaults.content_bucket),
            metadata_bucket: var("DOCSTORE_METADATA_BUCKET").unwrap_or(defaults.metadata_bucket),
            hash_algorithm: match var("DOCSTORE_HASH") {
                Some(value) => value
                    .parse()
                    .map_err(|_| DocstoreError::Config(format!("Invalid DOCSTORE_HASH value '{}'", value)))?,
                None => defaults.hash_algorithm,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check bucket names are usable by every backend
    pub fn validate(&self) -> Result<()> {
        for bucket in [&self.content_bucket, &self.metadata_bucket] {
            validate_bucket(bucket)
                .map_err(|e| DocstoreError::Config(format!("Invalid bucket '{}': {}", bucket, e)))?;
        }
        if self.content_bucket == self.metadata_bucket {
            return Err(DocstoreError::Config(
                "Content and metadata buckets must differ".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::FileSystem,
            root_path: PathBuf::from("./data"),
            content_bucket: "docstore-content".to_string(),
            metadata_bucket: "docstore-metadata".to_string(),
            hash_algorithm: HashAlgorithm::Sha256,
        }
    }
}
