//! Content-addressed blob storage with put-if-absent deduplication

use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, warn};

use crate::address::{ContentHash, ContentHasher, HashAlgorithm};
use crate::error::{DocstoreError, Result};
use crate::storage::{ObjectStorage, StorageError};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Hash-addressed blob store
///
/// Byte-identical inputs always resolve to the same [`ContentHash`] and share
/// a single stored object. Objects are immutable once written.
#[derive(Clone)]
pub struct ContentStore {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    algorithm: HashAlgorithm,
}

impl ContentStore {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        bucket: impl Into<String>,
        algorithm: HashAlgorithm,
    ) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            algorithm,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store `content` unless an object with the same hash already exists
    ///
    /// Returns the hash whether or not a write happened.
    pub async fn put(&self, content: &[u8]) -> Result<ContentHash> {
        let hash = ContentHash::compute(self.algorithm, content);
        self.put_hashed(&hash, content).await?;
        Ok(hash)
    }

    /// Hash and store streamed content, returning the hash and the bytes read
    pub async fn put_reader<R>(&self, mut reader: R) -> Result<(ContentHash, Bytes)>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut hasher = ContentHasher::new(self.algorithm);
        let mut content = Vec::new();
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            content.extend_from_slice(&buffer[..n]);
        }

        let hash = hasher.finalize();
        self.put_hashed(&hash, &content).await?;
        Ok((hash, Bytes::from(content)))
    }

    async fn put_hashed(&self, hash: &ContentHash, content: &[u8]) -> Result<()> {
        let key = hash.blob_key();

        if self.storage.exists(&self.bucket, &key).await? {
            debug!("Content {} already stored, skipping write", hash);
            return Ok(());
        }

        // Two writers may both see the key as absent. The value is determined by
        // the key, so a concurrent write of the same object is a success.
        match self.storage.put(&self.bucket, &key, content.to_vec()).await {
            Ok(()) => {
                debug!("Stored content {} ({} bytes)", hash, content.len());
                Ok(())
            }
            Err(StorageError::AlreadyExists(_)) => {
                warn!("Lost put race for content {}, object already present", hash);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Retrieve content by hash, verifying its digest
    ///
    /// Returns `Ok(None)` when no object exists under the hash.
    pub async fn get(&self, hash: &ContentHash) -> Result<Option<Bytes>> {
        let content = match self.storage.get(&self.bucket, &hash.blob_key()).await {
            Ok(content) => content,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !hash.verify(&content) {
            error!("Stored object for {} does not match its digest", hash);
            return Err(DocstoreError::ContentIntegrityMismatch {
                document_id: None,
                content_hash: hash.to_string(),
            });
        }

        Ok(Some(Bytes::from(content)))
    }

    /// Check if content with this hash is stored
    pub async fn exists(&self, hash: &ContentHash) -> Result<bool> {
        Ok(self.storage.exists(&self.bucket, &hash.blob_key()).await?)
    }

    /// Hashes of every stored object
    pub async fn list(&self) -> Result<Vec<ContentHash>> {
        let keys = self.storage.list_keys(&self.bucket, "blobs/").await?;
        keys.iter()
            .filter_map(|key| key.strip_prefix("blobs/"))
            .map(|hex| hex.parse::<ContentHash>())
            .collect()
    }
}
