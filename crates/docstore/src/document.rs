//! Document metadata lifecycle over the content store
//!
//! A [`Document`] record owns only metadata plus a reference (the content
//! hash) to its bytes. The bytes themselves live in the [`ContentStore`] and
//! may be shared by any number of documents.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::io::AsyncRead;
use tracing::{debug, error};

use crate::address::ContentHash;
use crate::content::ContentStore;
use crate::error::{DocstoreError, EntityKind, Result};
use crate::id::{DocumentId, IdGenerator, IdKind};
use crate::record::{RecordStore, next_timestamp};

/// Lifecycle status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Bytes captured, nothing derived yet
    Captured,
    /// Text or structure extracted
    Extracted,
    /// Passed a policy validation
    Validated,
    /// Produced by transforming another document
    Transformed,
    /// Produced by an assembly
    Assembled,
    /// Failed validation with no way forward
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Captured => "CAPTURED",
            DocumentStatus::Extracted => "EXTRACTED",
            DocumentStatus::Validated => "VALIDATED",
            DocumentStatus::Transformed => "TRANSFORMED",
            DocumentStatus::Assembled => "ASSEMBLED",
            DocumentStatus::Rejected => "REJECTED",
        }
    }
}

/// Bytes produced from another document by a pipeline step
#[derive(Debug, Clone)]
pub struct DerivedContent {
    pub content: Bytes,
    pub content_type: String,
    pub original_filename: String,
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: DocumentId,

    pub original_filename: String,

    /// MIME content type
    pub content_type: String,

    /// Length of the stored content, always recomputed on save
    pub size_bytes: u64,

    /// Hash of the stored content, always recomputed on save
    pub content_hash: Option<ContentHash>,

    pub status: DocumentStatus,

    /// Source document for transformed and assembled outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<DocumentId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,

    /// Raw bytes; never part of the metadata record
    #[serde(skip)]
    content: Option<Bytes>,
}

impl Document {
    /// Create a new captured document with no content
    pub fn new(
        document_id: impl Into<DocumentId>,
        original_filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            document_id: document_id.into(),
            original_filename: original_filename.into(),
            content_type: content_type.into(),
            size_bytes: 0,
            content_hash: None,
            status: DocumentStatus::Captured,
            derived_from: None,
            description: None,
            created_at: now,
            updated_at: now,
            content: None,
        }
    }

    /// New document holding pipeline output, linked to its source
    pub fn derived(
        document_id: impl Into<DocumentId>,
        source: &DocumentId,
        output: DerivedContent,
        status: DocumentStatus,
    ) -> Self {
        Document::new(document_id, output.original_filename, output.content_type)
            .with_content(output.content)
            .with_status(status)
            .with_derived_from(source.clone())
    }

    /// Attach inline content to be stored on the next save
    pub fn with_content(mut self, content: impl Into<Bytes>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_derived_from(mut self, source: impl Into<DocumentId>) -> Self {
        self.derived_from = Some(source.into());
        self
    }

    /// Content bytes, if loaded or attached
    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    /// Readable handle over the content
    pub fn content_reader(&self) -> Option<Cursor<Bytes>> {
        self.content.clone().map(Cursor::new)
    }

    /// Metadata equality, ignoring `updated_at` and attached bytes
    pub fn same_record(&self, other: &Document) -> bool {
        self.document_id == other.document_id
            && self.original_filename == other.original_filename
            && self.content_type == other.content_type
            && self.size_bytes == other.size_bytes
            && self.content_hash == other.content_hash
            && self.status == other.status
            && self.derived_from == other.derived_from
            && self.description == other.description
    }
}

/// Document persistence interface
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Generate a fresh document id; never derived from content
    fn generate_id(&self) -> DocumentId;

    /// Persist a document, storing its content first when attached
    ///
    /// The returned document carries the recomputed hash and size.
    async fn save(&self, document: Document) -> Result<Document>;

    /// Persist a document whose content comes from a stream
    async fn save_reader(
        &self,
        document: Document,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Document>;

    /// Load a document with its content, or `None` if absent or inconsistent
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>>;

    /// Load a document, surfacing why it could not be loaded
    async fn require(&self, id: &DocumentId) -> Result<Document>;

    /// Load several documents at once
    async fn get_many(&self, ids: &[DocumentId]) -> Result<HashMap<DocumentId, Option<Document>>>;

    /// Whether a metadata record exists for the id
    async fn exists(&self, id: &DocumentId) -> Result<bool>;

    /// Ids of all stored documents
    async fn list_ids(&self) -> Result<Vec<DocumentId>>;
}

/// Document repository over any [`ObjectStorage`](crate::storage::ObjectStorage) backend
#[derive(Clone)]
pub struct StoredDocumentRepository {
    content: ContentStore,
    records: RecordStore<Document>,
    ids: Arc<dyn IdGenerator>,
}

impl StoredDocumentRepository {
    pub(crate) fn new(
        content: ContentStore,
        records: RecordStore<Document>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            content,
            records,
            ids,
        }
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.content
    }

    /// Write the metadata record, preserving `created_at` and advancing `updated_at`
    async fn persist(&self, mut document: Document) -> Result<Document> {
        if let Some(existing) = self.records.load(document.document_id.as_str()).await? {
            document.created_at = existing.created_at;
            document.updated_at = next_timestamp(existing.updated_at);
            if existing.same_record(&document) {
                debug!("Document {} unchanged, refreshing timestamp", document.document_id);
            }
        } else {
            document.updated_at = next_timestamp(document.created_at);
        }

        self.records
            .store(document.document_id.as_str(), &document)
            .await?;
        debug!(
            "Saved document {} ({} bytes, status {})",
            document.document_id,
            document.size_bytes,
            document.status.as_str()
        );
        Ok(document)
    }

    async fn load_checked(&self, id: &DocumentId) -> Result<Document> {
        let mut document = self
            .records
            .load(id.as_str())
            .await?
            .ok_or_else(|| DocstoreError::not_found(EntityKind::Document, id.as_str()))?;

        if let Some(hash) = &document.content_hash {
            let content = match self.content.get(hash).await {
                Ok(Some(content)) => content,
                Ok(None) | Err(DocstoreError::ContentIntegrityMismatch { .. }) => {
                    return Err(DocstoreError::ContentIntegrityMismatch {
                        document_id: Some(id.to_string()),
                        content_hash: hash.to_string(),
                    });
                }
                Err(e) => return Err(e),
            };
            document.content = Some(content);
        }

        Ok(document)
    }
}

#[async_trait]
impl DocumentRepository for StoredDocumentRepository {
    fn generate_id(&self) -> DocumentId {
        DocumentId(self.ids.generate(IdKind::Document))
    }

    async fn save(&self, mut document: Document) -> Result<Document> {
        match document.content.clone() {
            Some(content) => {
                // Content first: a failed blob write must leave no metadata behind
                let hash = self.content.put(&content).await?;
                document.content_hash = Some(hash);
                document.size_bytes = content.len() as u64;
            }
            None => {
                if let Some(hash) = document.content_hash.clone() {
                    // Re-referencing existing content: the blob must be there,
                    // and the size comes from the blob, not the caller
                    let content = self.content.get(&hash).await?.ok_or_else(|| {
                        DocstoreError::not_found(EntityKind::Content, hash.to_string())
                    })?;
                    document.size_bytes = content.len() as u64;
                    document.content = Some(content);
                } else {
                    document.size_bytes = 0;
                }
            }
        }

        self.persist(document).await
    }

    async fn save_reader(
        &self,
        mut document: Document,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Document> {
        let (hash, content) = self.content.put_reader(reader).await?;

        document.content_hash = Some(hash);
        document.size_bytes = content.len() as u64;
        document.content = Some(content);
        self.persist(document).await
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
        match self.load_checked(id).await {
            Ok(document) => Ok(Some(document)),
            Err(DocstoreError::NotFound { .. }) => Ok(None),
            Err(DocstoreError::ContentIntegrityMismatch {
                document_id,
                content_hash,
            }) => {
                error!(
                    "Corruption: document {} references content {} which cannot be read",
                    document_id.unwrap_or_default(),
                    content_hash
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn require(&self, id: &DocumentId) -> Result<Document> {
        self.load_checked(id).await
    }

    async fn get_many(&self, ids: &[DocumentId]) -> Result<HashMap<DocumentId, Option<Document>>> {
        let mut documents = HashMap::with_capacity(ids.len());
        for id in ids {
            if !documents.contains_key(id) {
                let document = self.get(id).await?;
                documents.insert(id.clone(), document);
            }
        }
        Ok(documents)
    }

    async fn exists(&self, id: &DocumentId) -> Result<bool> {
        self.records.exists(id.as_str()).await
    }

    async fn list_ids(&self) -> Result<Vec<DocumentId>> {
        Ok(self
            .records
            .list_ids()
            .await?
            .into_iter()
            .map(DocumentId)
            .collect())
    }
}
