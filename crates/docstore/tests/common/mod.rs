//! Storage wrapper that fails chosen operations once

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use docstore::{MemoryStorage, ObjectStorage, StorageError};

struct PutFailure {
    bucket: String,
    prefix: String,
    /// Matching puts still to let through before failing
    skip: usize,
}

/// Delegates to a `MemoryStorage`, failing armed operations with a
/// transient backend error
pub struct FailingStorage {
    inner: Arc<MemoryStorage>,
    puts: Mutex<Vec<PutFailure>>,
    failing_gets: Mutex<Vec<String>>,
}

impl FailingStorage {
    pub fn new(inner: Arc<MemoryStorage>) -> Self {
        Self {
            inner,
            puts: Mutex::new(Vec::new()),
            failing_gets: Mutex::new(Vec::new()),
        }
    }

    /// Fail the `nth` put (1-based) under `bucket/prefix`, once
    pub fn fail_nth_put(&self, bucket: &str, prefix: &str, nth: usize) {
        assert!(nth > 0);
        self.puts.lock().unwrap().push(PutFailure {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            skip: nth - 1,
        });
    }

    /// Fail every get from `bucket`
    pub fn fail_gets(&self, bucket: &str) {
        self.failing_gets.lock().unwrap().push(bucket.to_string());
    }

    fn take_put_failure(&self, bucket: &str, key: &str) -> bool {
        let mut puts = self.puts.lock().unwrap();
        let Some(index) = puts
            .iter()
            .position(|f| f.bucket == bucket && key.starts_with(&f.prefix))
        else {
            return false;
        };

        if puts[index].skip == 0 {
            puts.remove(index);
            true
        } else {
            puts[index].skip -= 1;
            false
        }
    }
}

fn injected(bucket: &str, key: &str) -> StorageError {
    StorageError::Backend(format!("injected failure on '{}/{}'", bucket, key))
}

#[async_trait]
impl ObjectStorage for FailingStorage {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        if self.take_put_failure(bucket, key) {
            return Err(injected(bucket, key));
        }
        self.inner.put(bucket, key, data).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        if self.failing_gets.lock().unwrap().iter().any(|b| b == bucket) {
            return Err(injected(bucket, key));
        }
        self.inner.get(bucket, key).await
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(bucket, key).await
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list_keys(bucket, prefix).await
    }
}
