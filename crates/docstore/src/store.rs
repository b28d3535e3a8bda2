//! Wiring of every component over one storage backend

use std::sync::Arc;
use tracing::info;

use crate::assembly::AssemblyCoordinator;
use crate::config::{BackendKind, StoreConfig};
use crate::content::ContentStore;
use crate::document::StoredDocumentRepository;
use crate::error::Result;
use crate::id::{IdGenerator, PrefixedIdGenerator};
use crate::record::RecordStore;
use crate::storage::{FileSystemStorage, MemoryStorage, ObjectStorage};
use crate::validation::PolicyValidationEngine;

const DOCUMENTS: &str = "documents";
const VALIDATIONS: &str = "validations";
const ASSEMBLIES: &str = "assemblies";

/// Document store handle
///
/// Cloning is cheap; all clones share the same backend.
#[derive(Clone)]
pub struct Docstore {
    storage: Arc<dyn ObjectStorage>,
    config: StoreConfig,
    content: ContentStore,
    documents: Arc<StoredDocumentRepository>,
    validations: PolicyValidationEngine,
    assemblies: AssemblyCoordinator,
}

impl Docstore {
    /// Open the backend named by `config`
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let storage: Arc<dyn ObjectStorage> = match config.backend {
            BackendKind::Memory => Arc::new(MemoryStorage::new()),
            BackendKind::FileSystem => Arc::new(FileSystemStorage::new(&config.root_path).await?),
            BackendKind::S3 => open_s3(config).await?,
        };

        info!(
            "Opened {:?} document store (content: {}, metadata: {})",
            config.backend, config.content_bucket, config.metadata_bucket
        );
        Ok(Self::with_storage(storage, config.clone()))
    }

    /// Build over an existing backend
    pub fn with_storage(storage: Arc<dyn ObjectStorage>, config: StoreConfig) -> Self {
        Self::with_id_generator(storage, config, Arc::new(PrefixedIdGenerator))
    }

    /// Build over an existing backend with a custom id source
    pub fn with_id_generator(
        storage: Arc<dyn ObjectStorage>,
        config: StoreConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let content = ContentStore::new(
            storage.clone(),
            config.content_bucket.clone(),
            config.hash_algorithm,
        );
        let documents = Arc::new(StoredDocumentRepository::new(
            content.clone(),
            RecordStore::new(storage.clone(), config.metadata_bucket.clone(), DOCUMENTS),
            ids.clone(),
        ));
        let validations = PolicyValidationEngine::new(
            RecordStore::new(storage.clone(), config.metadata_bucket.clone(), VALIDATIONS),
            documents.clone(),
            ids.clone(),
        );
        let assemblies = AssemblyCoordinator::new(
            RecordStore::new(storage.clone(), config.metadata_bucket.clone(), ASSEMBLIES),
            documents.clone(),
            ids,
        );

        Self {
            storage,
            config,
            content,
            documents,
            validations,
            assemblies,
        }
    }

    /// In-memory store with default settings
    pub fn in_memory() -> Self {
        let config = StoreConfig {
            backend: BackendKind::Memory,
            ..StoreConfig::default()
        };
        Self::with_storage(Arc::new(MemoryStorage::new()), config)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    pub fn documents(&self) -> &StoredDocumentRepository {
        &self.documents
    }

    pub fn validations(&self) -> &PolicyValidationEngine {
        &self.validations
    }

    pub fn assemblies(&self) -> &AssemblyCoordinator {
        &self.assemblies
    }
}

#[cfg(feature = "s3")]
async fn open_s3(config: &StoreConfig) -> Result<Arc<dyn ObjectStorage>> {
    let storage = crate::storage::s3_storage::S3Storage::from_env()?;
    storage.ensure_bucket(&config.content_bucket).await?;
    storage.ensure_bucket(&config.metadata_bucket).await?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "s3"))]
async fn open_s3(_config: &StoreConfig) -> Result<Arc<dyn ObjectStorage>> {
    Err(crate::error::DocstoreError::Config(
        "S3 backend requires the `s3` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, DocumentRepository};

    #[tokio::test]
    async fn test_components_share_backend() {
        let storage = Arc::new(MemoryStorage::new());
        let store = Docstore::with_storage(storage.clone(), StoreConfig::default());

        let doc = store
            .documents()
            .save(Document::new(store.documents().generate_id(), "a.txt", "text/plain").with_content("a"))
            .await
            .unwrap();

        assert_eq!(storage.len("docstore-content"), 1);
        assert!(
            storage
                .keys("docstore-metadata")
                .contains(&format!("documents/{}.json", doc.document_id))
        );
        let hash = doc.content_hash.unwrap();
        assert!(store.content().exists(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_filesystem_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            root_path: dir.path().to_path_buf(),
            ..StoreConfig::default()
        };

        let store = Docstore::open(&config).await.unwrap();
        let hash = store.content().put(b"persisted").await.unwrap();

        let reopened = Docstore::open(&config).await.unwrap();
        assert_eq!(
            &reopened.content().get(&hash).await.unwrap().unwrap()[..],
            b"persisted"
        );
    }

    #[cfg(not(feature = "s3"))]
    #[tokio::test]
    async fn test_open_s3_without_feature_fails() {
        let config = StoreConfig {
            backend: BackendKind::S3,
            ..StoreConfig::default()
        };
        assert!(matches!(
            Docstore::open(&config).await,
            Err(crate::error::DocstoreError::Config(_))
        ));
    }
}
