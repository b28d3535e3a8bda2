//! In-memory object storage for testing and development

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{ObjectStorage, StorageError, validate_bucket, validate_key};

/// In-memory storage implementation for testing
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    writes: Mutex<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all stored keys in a bucket (useful for testing)
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of objects stored in a bucket
    pub fn len(&self, bucket: &str) -> usize {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Check if a bucket holds no objects
    pub fn is_empty(&self, bucket: &str) -> bool {
        self.len(bucket) == 0
    }

    /// Total number of `put` calls that reached the backend
    pub fn write_count(&self) -> u64 {
        *self.writes.lock().unwrap()
    }

    /// Remove an object behind the store's back (useful for corruption tests)
    pub fn remove(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .unwrap()
            .get_mut(bucket)
            .and_then(|objects| objects.remove(key))
    }

    /// Overwrite an object without going through `put` (useful for corruption tests)
    pub fn overwrite(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data);
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;

        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| StorageError::Backend("Lock poisoned".into()))?;

        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data);

        let mut writes = self
            .writes
            .lock()
            .map_err(|_| StorageError::Backend("Lock poisoned".into()))?;
        *writes += 1;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;

        let buckets = self
            .buckets
            .lock()
            .map_err(|_| StorageError::Backend("Lock poisoned".into()))?;

        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;

        let buckets = self
            .buckets
            .lock()
            .map_err(|_| StorageError::Backend("Lock poisoned".into()))?;

        Ok(buckets
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let buckets = self
            .buckets
            .lock()
            .map_err(|_| StorageError::Backend("Lock poisoned".into()))?;

        Ok(buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .keys()
                    .filter(|key| key.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
