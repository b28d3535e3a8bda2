//! Object storage abstraction shared by the content and metadata buckets

use async_trait::async_trait;

pub mod filesystem;
pub mod memory;

pub use filesystem::FileSystemStorage;
pub use memory::MemoryStorage;

#[cfg(feature = "s3")]
pub mod s3_storage;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Key not found: {0}")]
    NotFound(String),

    /// A conditional write found the key already present
    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Transient failures are safe to retry since every write is idempotent
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Backend(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Abstraction for object storage backends
///
/// Objects are addressed by `(bucket, key)`. Callers depend only on this
/// trait; each backend (memory, filesystem, S3) implements it once.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store data at the given key, replacing any previous value
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// Retrieve data by key
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Check if key exists
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    /// List keys starting with `prefix`, sorted
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Shared key rules: relative, non-empty, no traversal segments
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.len() > 1024 {
        return Err(StorageError::InvalidKey(
            "Key must be between 1 and 1024 characters".into(),
        ));
    }

    if key.starts_with('/') || key.ends_with('/') {
        return Err(StorageError::InvalidKey(
            "Key cannot start or end with '/'".into(),
        ));
    }

    if key.split('/').any(|segment| segment == ".." || segment == "." || segment.is_empty()) {
        return Err(StorageError::InvalidKey(format!(
            "Key '{}' contains an invalid path segment",
            key
        )));
    }

    Ok(())
}

pub(crate) fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    let valid = !bucket.is_empty()
        && bucket.len() <= 63
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && !bucket.starts_with(['-', '.'])
        && !bucket.ends_with(['-', '.']);

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(format!(
            "Invalid bucket name '{}'",
            bucket
        )))
    }
}
