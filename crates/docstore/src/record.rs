//! JSON metadata records in the metadata bucket

use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

use crate::address::{index_key, record_key};
use crate::error::Result;
use crate::storage::{ObjectStorage, StorageError};

/// Typed view over one record family (`documents/`, `validations/`, ...)
pub(crate) struct RecordStore<T> {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    prefix: &'static str,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for RecordStore<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            bucket: self.bucket.clone(),
            prefix: self.prefix,
            _record: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> RecordStore<T> {
    pub(crate) fn new(
        storage: Arc<dyn ObjectStorage>,
        bucket: impl Into<String>,
        prefix: &'static str,
    ) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            prefix,
            _record: PhantomData,
        }
    }

    pub(crate) async fn load(&self, id: &str) -> Result<Option<T>> {
        match self.storage.get(&self.bucket, &record_key(self.prefix, id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn store(&self, id: &str, record: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        self.storage
            .put(&self.bucket, &record_key(self.prefix, id), bytes)
            .await?;
        Ok(())
    }

    pub(crate) async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self
            .storage
            .exists(&self.bucket, &record_key(self.prefix, id))
            .await?)
    }

    /// Ids of every stored record, sorted
    pub(crate) async fn list_ids(&self) -> Result<Vec<String>> {
        let prefix = format!("{}/", self.prefix);
        let keys = self.storage.list_keys(&self.bucket, &prefix).await?;
        Ok(keys
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix)?.strip_suffix(".json"))
            .filter(|id| !id.contains('/'))
            .map(str::to_string)
            .collect())
    }

    /// Look up the record id registered under an idempotency key
    pub(crate) async fn lookup_index(&self, parts: &[&str]) -> Result<Option<String>> {
        match self.storage.get(&self.bucket, &index_key(self.prefix, parts)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn write_index(&self, parts: &[&str], id: &str) -> Result<()> {
        let bytes = serde_json::to_vec(id)?;
        self.storage
            .put(&self.bucket, &index_key(self.prefix, parts), bytes)
            .await?;
        Ok(())
    }
}

/// Next `updated_at` value: now, but strictly after `previous`
pub(crate) fn next_timestamp(previous: OffsetDateTime) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}
