//! # Docstore
//!
//! Content-addressed document storage with policy validation and assembly
//! tracking:
//! - Byte-identical content is stored once, keyed by a self-describing hash
//! - Document metadata records reference content by hash
//! - Policy validations record scores, an optional transform and an outcome
//! - Assemblies track the production of a final document
//!
//! ## Core Concepts
//!
//! - **Content** is immutable and addressed by its multihash
//! - **Documents** are mutable metadata records over shared content
//! - **Validations** and **assemblies** are state machines whose terminal
//!   states cannot be left, so re-delivered requests converge
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use docstore::*;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let store = Docstore::in_memory();
//!
//! let document = Document::new(store.documents().generate_id(), "invoice.pdf", "application/pdf")
//!     .with_content(b"%PDF-1.7".to_vec());
//! let document = store.documents().save(document).await?;
//!
//! let validation_id = store
//!     .validations()
//!     .start(&document.document_id, "invoice-policy")
//!     .await?;
//! store.validations().record_score(&validation_id, "legibility", 92.0).await?;
//! let validation = store.validations().complete(&validation_id, true).await?;
//!
//! println!("validation {} is {}", validation_id, validation.status());
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod assembly;
pub mod config;
pub mod content;
pub mod document;
pub mod error;
pub mod id;
mod record;
pub mod storage;
pub mod store;
pub mod validation;

pub use address::{ContentHash, HashAlgorithm};
pub use assembly::{Assembler, Assembly, AssemblyCoordinator, AssemblyState, AssemblyStatus};
pub use config::{BackendKind, StoreConfig};
pub use content::ContentStore;
pub use document::{
    DerivedContent, Document, DocumentRepository, DocumentStatus, StoredDocumentRepository,
};
pub use error::{DocstoreError, EntityKind, Result};
pub use id::{AssemblyId, DocumentId, IdGenerator, IdKind, PrefixedIdGenerator, ValidationId};
pub use storage::{FileSystemStorage, MemoryStorage, ObjectStorage, StorageError};
pub use store::Docstore;
pub use validation::{
    DocumentPolicyValidation, DocumentTransformer, MeanScore, MinimumScore, PolicyCheck,
    PolicyDefinition, PolicyValidationEngine, ScoringPolicy, Transform, ValidationScore,
    ValidationState, ValidationStatus,
};

#[cfg(feature = "s3")]
pub use storage::s3_storage::S3Storage;
