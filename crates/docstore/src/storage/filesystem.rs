//! Filesystem-backed object storage
//!
//! Directory structure:
//! ```text
//! base_path/
//! ├── content/
//! │   └── blobs/
//! │       └── 1220<sha2-256 hex>
//! └── metadata/
//!     ├── documents/
//!     │   └── doc_<id>.json
//!     ├── validations/
//!     └── assemblies/
//! ```

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use super::{ObjectStorage, StorageError, validate_bucket, validate_key};

const TEMP_MARKER: &str = ".tmp-";

/// File-based implementation of ObjectStorage
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    base_path: PathBuf,
}

impl FileSystemStorage {
    /// Create a new filesystem storage rooted at `base_path`
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::Backend(format!(
                "Failed to create storage root {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        if key.split('/').any(|segment| segment.contains(TEMP_MARKER)) {
            return Err(StorageError::InvalidKey(format!(
                "Key '{}' uses a reserved name",
                key
            )));
        }
        Ok(self.bucket_dir(bucket).join(key))
    }

    /// Helper function to recursively list files in a directory
    async fn list_files_recursive(
        &self,
        dir: &Path,
        base: &Path,
        files: &mut Vec<String>,
    ) -> Result<(), StorageError> {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if entry.file_type().await?.is_dir() {
                // Use Box::pin for recursive call
                Box::pin(self.list_files_recursive(&path, base, files)).await?;
            } else if let Ok(rel_path) = path.strip_prefix(base) {
                let key = rel_path
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !key.contains(TEMP_MARKER) {
                    files.push(key);
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for FileSystemStorage {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a sibling temp file and rename so readers never see a torn object
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(
            "{}{}{}",
            file_name,
            TEMP_MARKER,
            Uuid::new_v4().simple()
        ));

        if let Err(e) = fs::write(&temp_path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Backend(format!(
                "Failed to write {}: {}",
                path.display(),
                e
            )));
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Backend(format!(
                "Failed to commit {}: {}",
                path.display(),
                e
            )));
        }

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;

        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(format!("{}/{}", bucket, key)),
            _ => StorageError::Backend(format!("Failed to read {}: {}", path.display(), e)),
        })
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(bucket, key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        validate_bucket(bucket)?;
        let bucket_dir = self.bucket_dir(bucket);
        if !fs::try_exists(&bucket_dir).await? {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        self.list_files_recursive(&bucket_dir, &bucket_dir, &mut keys)
            .await?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}
