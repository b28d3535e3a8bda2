//! S3-compatible object storage using the MinIO client
//!
//! Works with AWS S3, MinIO, and any S3-compatible object store. Each logical
//! bucket maps to a real S3 bucket of the same name.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use minio::s3::{
    client::Client,
    creds::StaticProvider,
    http::BaseUrl,
    segmented_bytes::SegmentedBytes,
    types::{S3Api, ToStream},
};
use std::str::FromStr;

use super::{ObjectStorage, StorageError, validate_bucket, validate_key};

/// S3-compatible storage implementation using MinIO client
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create S3 storage from environment variables
    ///
    /// Expects:
    /// - S3_ACCESS_KEY_ID
    /// - S3_SECRET_ACCESS_KEY
    /// - S3_ENDPOINT_URL (for S3-compatible services like MinIO)
    pub fn from_env() -> Result<Self, StorageError> {
        let access_key = std::env::var("S3_ACCESS_KEY_ID").map_err(|_| {
            StorageError::Backend("S3_ACCESS_KEY_ID environment variable not set".to_string())
        })?;

        let secret_key = std::env::var("S3_SECRET_ACCESS_KEY").map_err(|_| {
            StorageError::Backend("S3_SECRET_ACCESS_KEY environment variable not set".to_string())
        })?;

        let endpoint_url = std::env::var("S3_ENDPOINT_URL").map_err(|_| {
            StorageError::Backend("S3_ENDPOINT_URL environment variable not set".to_string())
        })?;

        let base_url = BaseUrl::from_str(&endpoint_url)
            .map_err(|e| StorageError::Backend(format!("Invalid S3_ENDPOINT_URL: {}", e)))?;

        let creds_provider = StaticProvider::new(&access_key, &secret_key, None);

        let client = Client::new(base_url, Some(Box::new(creds_provider)), None, None)
            .map_err(|e| StorageError::Backend(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self::new(client))
    }

    /// Ensure bucket exists (create if it doesn't)
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        validate_bucket(bucket)?;

        let response = self
            .client
            .bucket_exists(bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!("Failed to check bucket '{}': {}", bucket, e))
            })?;

        if response.exists {
            return Ok(());
        }

        self.client.create_bucket(bucket).send().await.map_err(|e| {
            StorageError::Backend(format!("Failed to create bucket '{}': {}", bucket, e))
        })?;

        Ok(())
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("NoSuchKey") || message.contains("NoSuchBucket") || message.contains("404")
}

/// Puts are unconditional overwrites, so every failure is a backend failure
fn put_failed(bucket: &str, key: &str, message: &str) -> StorageError {
    StorageError::Backend(format!("Failed to put '{}/{}': {}", bucket, key, message))
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;

        let bytes = SegmentedBytes::from(Bytes::from(data));

        self.client
            .put_object(bucket, key, bytes)
            .send()
            .await
            .map_err(|e| put_failed(bucket, key, &e.to_string()))?;

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;

        let response = self
            .client
            .get_object(bucket, key)
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if is_not_found(&message) {
                    StorageError::NotFound(format!("{}/{}", bucket, key))
                } else {
                    StorageError::Backend(format!("Failed to get '{}/{}': {}", bucket, key, message))
                }
            })?;

        let content = response.content.to_segmented_bytes().await.map_err(|e| {
            StorageError::Backend(format!("Failed to read '{}/{}' content: {}", bucket, key, e))
        })?;

        Ok(content.to_bytes().to_vec())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;

        match self.client.stat_object(bucket, key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let message = e.to_string();
                if is_not_found(&message) {
                    Ok(false)
                } else {
                    Err(StorageError::Backend(format!(
                        "Failed to check existence of '{}/{}': {}",
                        bucket, key, message
                    )))
                }
            }
        }
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        validate_bucket(bucket)?;

        let mut keys = Vec::new();
        let mut stream = self
            .client
            .list_objects(bucket)
            .prefix(Some(prefix.to_string()))
            .recursive(true)
            .to_stream()
            .await;

        while let Some(result) = stream.next().await {
            match result {
                Ok(response) => {
                    for entry in response.contents {
                        keys.push(entry.name);
                    }
                }
                Err(e) => {
                    return Err(StorageError::Backend(format!(
                        "Failed to list '{}' with prefix '{}': {}",
                        bucket, prefix, e
                    )));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
