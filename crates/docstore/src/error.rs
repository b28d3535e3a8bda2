//! Error types for the document store

use thiserror::Error;

use crate::storage::StorageError;

/// Kind of entity an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Document,
    Validation,
    Assembly,
    Content,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Document => "document",
            EntityKind::Validation => "validation",
            EntityKind::Assembly => "assembly",
            EntityKind::Content => "content",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn owner(document_id: &Option<String>) -> String {
    match document_id {
        Some(id) => format!("document {}", id),
        None => "content".to_string(),
    }
}

/// Document store errors
#[derive(Error, Debug)]
pub enum DocstoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Content integrity mismatch for {}: {content_hash}", owner(.document_id))]
    ContentIntegrityMismatch {
        document_id: Option<String>,
        content_hash: String,
    },

    #[error("Invalid state transition for {kind} {id}: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        kind: EntityKind,
        id: String,
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline step failed: {0}")]
    Pipeline(String),
}

impl DocstoreError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_transition(
        kind: EntityKind,
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidStateTransition {
            kind,
            id: id.into(),
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Whether the orchestrator may safely retry the failed operation.
    ///
    /// All writes are idempotent, so transient backend failures are retryable.
    /// Integrity and state-machine violations are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DocstoreError::Storage(e) => e.is_transient(),
            DocstoreError::Io(_) => true,
            _ => false,
        }
    }
}

/// Result type for document store operations
pub type Result<T> = std::result::Result<T, DocstoreError>;
