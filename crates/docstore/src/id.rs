//! Entity identifiers and id generation

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a document
    DocumentId
);
entity_id!(
    /// Unique identifier for a policy validation record
    ValidationId
);
entity_id!(
    /// Unique identifier for an assembly
    AssemblyId
);

/// Kinds of entity that receive generated ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Document,
    Validation,
    Assembly,
}

impl IdKind {
    /// Human-readable prefix, for operability only
    pub fn prefix(&self) -> &'static str {
        match self {
            IdKind::Document => "doc",
            IdKind::Validation => "val",
            IdKind::Assembly => "asm",
        }
    }
}

/// Source of globally unique ids
///
/// Ids must never be derived from content: a retry that regenerates an id
/// for the same logical document must not collide with deduplicated content.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, kind: IdKind) -> String;
}

/// Default generator: `<prefix>_<uuid v7>`, time-sortable and collision resistant
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixedIdGenerator;

impl IdGenerator for PrefixedIdGenerator {
    fn generate(&self, kind: IdKind) -> String {
        format!("{}_{}", kind.prefix(), Uuid::now_v7().simple())
    }
}
