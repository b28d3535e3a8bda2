//! Assembly of final documents from validated inputs
//!
//! ```text
//! PENDING -> IN_PROGRESS -> COMPLETED (assembled document set)
//!         -> FAILED          -> FAILED
//!         -> COMPLETED
//! ```
//!
//! The assembled document id is carried by the `Completed` variant itself,
//! so it exists exactly when the assembly is completed and cannot be
//! cleared afterwards.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::document::{DerivedContent, Document, DocumentRepository, DocumentStatus};
use crate::error::{DocstoreError, EntityKind, Result};
use crate::id::{AssemblyId, DocumentId, IdGenerator, IdKind};
use crate::record::{RecordStore, next_timestamp};

/// Flat status of an assembly, used to request transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssemblyStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl AssemblyStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssemblyStatus::Completed | AssemblyStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssemblyStatus::Pending => "PENDING",
            AssemblyStatus::InProgress => "IN_PROGRESS",
            AssemblyStatus::Completed => "COMPLETED",
            AssemblyStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AssemblyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssemblyState {
    Pending,
    InProgress {
        /// Id reserved for the document `run` produces
        #[serde(default, skip_serializing_if = "Option::is_none")]
        planned_output: Option<DocumentId>,
    },
    Completed {
        assembled_document_id: DocumentId,
    },
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl AssemblyState {
    pub fn status(&self) -> AssemblyStatus {
        match self {
            AssemblyState::Pending => AssemblyStatus::Pending,
            AssemblyState::InProgress { .. } => AssemblyStatus::InProgress,
            AssemblyState::Completed { .. } => AssemblyStatus::Completed,
            AssemblyState::Failed { .. } => AssemblyStatus::Failed,
        }
    }
}

/// One assembly of a specification over an input document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    assembly_id: AssemblyId,
    assembly_specification_id: String,
    input_document_id: DocumentId,
    workflow_id: String,
    state: AssemblyState,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl Assembly {
    pub fn new(
        assembly_id: AssemblyId,
        assembly_specification_id: impl Into<String>,
        input_document_id: DocumentId,
        workflow_id: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            assembly_id,
            assembly_specification_id: assembly_specification_id.into(),
            input_document_id,
            workflow_id: workflow_id.into(),
            state: AssemblyState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn assembly_id(&self) -> &AssemblyId {
        &self.assembly_id
    }

    pub fn assembly_specification_id(&self) -> &str {
        &self.assembly_specification_id
    }

    pub fn input_document_id(&self) -> &DocumentId {
        &self.input_document_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn state(&self) -> &AssemblyState {
        &self.state
    }

    pub fn status(&self) -> AssemblyStatus {
        self.state.status()
    }

    pub fn assembled_document_id(&self) -> Option<&DocumentId> {
        match &self.state {
            AssemblyState::Completed {
                assembled_document_id,
            } => Some(assembled_document_id),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            AssemblyState::Failed { reason } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    fn rejected(&self, to: AssemblyStatus, reason: impl Into<String>) -> DocstoreError {
        DocstoreError::invalid_transition(
            EntityKind::Assembly,
            self.assembly_id.as_str(),
            self.status().as_str(),
            to.as_str(),
            reason,
        )
    }

    /// Apply a requested transition; returns whether anything changed
    pub fn advance(
        &mut self,
        to: AssemblyStatus,
        assembled_document_id: Option<DocumentId>,
        reason: Option<String>,
    ) -> Result<bool> {
        if to != AssemblyStatus::Completed && assembled_document_id.is_some() {
            return Err(self.rejected(to, "assembled document id is only set on completion"));
        }

        match (&self.state, to) {
            (AssemblyState::Pending, AssemblyStatus::Pending)
            | (AssemblyState::InProgress { .. }, AssemblyStatus::InProgress)
            | (AssemblyState::Failed { .. }, AssemblyStatus::Failed) => Ok(false),

            (
                AssemblyState::Completed {
                    assembled_document_id: current,
                },
                AssemblyStatus::Completed,
            ) => match assembled_document_id {
                Some(id) if &id == current => Ok(false),
                Some(id) => Err(self.rejected(
                    to,
                    format!("already completed with {}, refusing {}", current, id),
                )),
                None => Err(self.rejected(to, "completion requires an assembled document id")),
            },

            (AssemblyState::Pending, AssemblyStatus::InProgress) => {
                self.state = AssemblyState::InProgress {
                    planned_output: None,
                };
                Ok(true)
            }

            (AssemblyState::Pending | AssemblyState::InProgress { .. }, AssemblyStatus::Completed) => {
                let Some(assembled_document_id) = assembled_document_id else {
                    return Err(self.rejected(to, "completion requires an assembled document id"));
                };
                if let Some(planned) = self.planned_output() {
                    if planned != &assembled_document_id {
                        return Err(self.rejected(
                            to,
                            format!("output {} is reserved, refusing {}", planned, assembled_document_id),
                        ));
                    }
                }
                self.state = AssemblyState::Completed {
                    assembled_document_id,
                };
                Ok(true)
            }

            (AssemblyState::Pending | AssemblyState::InProgress { .. }, AssemblyStatus::Failed) => {
                self.state = AssemblyState::Failed { reason };
                Ok(true)
            }

            (_, to) => Err(self.rejected(to, "transition not allowed")),
        }
    }

    /// Id reserved for the assembled document while IN_PROGRESS
    pub fn planned_output(&self) -> Option<&DocumentId> {
        match &self.state {
            AssemblyState::InProgress { planned_output } => planned_output.as_ref(),
            _ => None,
        }
    }

    /// Reserve `output` as the assembled document id
    ///
    /// An earlier reservation wins and nothing changes.
    pub fn reserve_output(&mut self, output: DocumentId) -> Result<bool> {
        if let AssemblyState::InProgress { planned_output } = &mut self.state {
            if planned_output.is_some() {
                return Ok(false);
            }
            *planned_output = Some(output);
            return Ok(true);
        }
        Err(self.rejected(
            AssemblyStatus::InProgress,
            "output can only be reserved while in progress",
        ))
    }
}

/// Builds an assembled document from a validated input
#[async_trait]
pub trait Assembler: Send + Sync {
    async fn assemble(&self, assembly: &Assembly, input: &Document) -> Result<DerivedContent>;
}

/// Creates and advances assemblies
#[derive(Clone)]
pub struct AssemblyCoordinator {
    records: RecordStore<Assembly>,
    documents: Arc<dyn DocumentRepository>,
    ids: Arc<dyn IdGenerator>,
}

impl AssemblyCoordinator {
    pub(crate) fn new(
        records: RecordStore<Assembly>,
        documents: Arc<dyn DocumentRepository>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            records,
            documents,
            ids,
        }
    }

    /// Create a pending assembly
    ///
    /// The same workflow, specification and input always map to the same
    /// assembly, so re-delivery never creates a second record.
    pub async fn create(
        &self,
        assembly_specification_id: &str,
        input_document_id: &DocumentId,
        workflow_id: &str,
    ) -> Result<AssemblyId> {
        let key = [workflow_id, assembly_specification_id, input_document_id.as_str()];

        let assembly_id = match self.records.lookup_index(&key).await? {
            Some(existing) => {
                let existing = AssemblyId(existing);
                if self.records.exists(existing.as_str()).await? {
                    debug!(
                        "Assembly {} already exists for workflow {}",
                        existing, workflow_id
                    );
                    return Ok(existing);
                }
                existing
            }
            None => {
                let id = AssemblyId(self.ids.generate(IdKind::Assembly));
                self.records.write_index(&key, id.as_str()).await?;
                id
            }
        };

        let assembly = Assembly::new(
            assembly_id.clone(),
            assembly_specification_id,
            input_document_id.clone(),
            workflow_id,
        );
        self.records.store(assembly_id.as_str(), &assembly).await?;

        info!(
            "Created assembly {} of {} for document {} in workflow {}",
            assembly_id, assembly_specification_id, input_document_id, workflow_id
        );
        Ok(assembly_id)
    }

    pub async fn get(&self, assembly_id: &AssemblyId) -> Result<Option<Assembly>> {
        self.records.load(assembly_id.as_str()).await
    }

    /// Move an assembly to `to`
    ///
    /// Always works against the persisted record, never a caller's copy.
    /// Repeating a transition that already happened is a no-op and writes
    /// nothing.
    pub async fn advance(
        &self,
        assembly_id: &AssemblyId,
        to: AssemblyStatus,
        assembled_document_id: Option<&DocumentId>,
    ) -> Result<Assembly> {
        self.transition(assembly_id, to, assembled_document_id.cloned(), None)
            .await
    }

    /// Move an assembly to FAILED with a reason
    pub async fn fail(&self, assembly_id: &AssemblyId, reason: impl Into<String>) -> Result<Assembly> {
        self.transition(assembly_id, AssemblyStatus::Failed, None, Some(reason.into()))
            .await
    }

    async fn transition(
        &self,
        assembly_id: &AssemblyId,
        to: AssemblyStatus,
        assembled_document_id: Option<DocumentId>,
        reason: Option<String>,
    ) -> Result<Assembly> {
        let mut from = None;
        let (assembly, changed) = self
            .update(assembly_id, |assembly| {
                from = Some(assembly.status());
                assembly.advance(to, assembled_document_id, reason)
            })
            .await?;

        match from {
            Some(from) if changed => info!("Assembly {}: {} -> {}", assembly_id, from, to),
            _ => debug!("Assembly {} already {}", assembly_id, to),
        }
        Ok(assembly)
    }

    /// Reserve the id `run` saves its output under
    ///
    /// Returns the existing reservation when there is one, so every retry
    /// of `run` writes the same document.
    async fn reserve_output(&self, assembly_id: &AssemblyId) -> Result<DocumentId> {
        let candidate = self.documents.generate_id();
        let (assembly, changed) = self
            .update(assembly_id, |assembly| assembly.reserve_output(candidate))
            .await?;

        let planned = assembly.planned_output().cloned().ok_or_else(|| {
            DocstoreError::Pipeline(format!("assembly {} has no reserved output", assembly_id))
        })?;
        if changed {
            debug!("Assembly {}: reserved output {}", assembly_id, planned);
        }
        Ok(planned)
    }

    /// Load the persisted assembly, apply `change`, store it if anything changed
    async fn update<F>(&self, assembly_id: &AssemblyId, change: F) -> Result<(Assembly, bool)>
    where
        F: FnOnce(&mut Assembly) -> Result<bool>,
    {
        let mut assembly = self.get(assembly_id).await?.ok_or_else(|| {
            DocstoreError::not_found(EntityKind::Assembly, assembly_id.as_str())
        })?;

        let changed = change(&mut assembly)
            .inspect_err(|e| warn!("Rejected change to assembly {}: {}", assembly_id, e))?;

        if changed {
            assembly.updated_at = next_timestamp(assembly.updated_at);
            self.records.store(assembly_id.as_str(), &assembly).await?;
        }
        Ok((assembly, changed))
    }

    /// Drive an assembly to a terminal state with `assembler`
    ///
    /// Retryable errors leave the assembly IN_PROGRESS for the caller to
    /// retry; any other failure marks it FAILED. A terminal assembly is
    /// returned unchanged. The output id is reserved on the record before
    /// anything is saved, so a retry reuses it instead of adding a document.
    pub async fn run(&self, assembly_id: &AssemblyId, assembler: &dyn Assembler) -> Result<Assembly> {
        let assembly = self.get(assembly_id).await?.ok_or_else(|| {
            DocstoreError::not_found(EntityKind::Assembly, assembly_id.as_str())
        })?;
        if assembly.status().is_terminal() {
            return Ok(assembly);
        }

        let assembly = self
            .advance(assembly_id, AssemblyStatus::InProgress, None)
            .await?;
        let output_id = match assembly.planned_output() {
            Some(planned) => planned.clone(),
            None => self.reserve_output(assembly_id).await?,
        };

        if self.documents.exists(&output_id).await? {
            debug!(
                "Assembly {}: output {} already saved",
                assembly_id, output_id
            );
            return self
                .advance(assembly_id, AssemblyStatus::Completed, Some(&output_id))
                .await;
        }

        let input = match self.documents.require(assembly.input_document_id()).await {
            Ok(input) => input,
            Err(DocstoreError::NotFound { .. }) => {
                return self
                    .fail(
                        assembly_id,
                        format!("input document {} not found", assembly.input_document_id()),
                    )
                    .await;
            }
            Err(e) => return Err(e),
        };

        let output = match assembler.assemble(&assembly, &input).await {
            Ok(output) => output,
            Err(e) if e.is_retryable() => return Err(e),
            Err(e) => return self.fail(assembly_id, e.to_string()).await,
        };

        let assembled = Document::derived(
            output_id,
            &input.document_id,
            output,
            DocumentStatus::Assembled,
        );
        let assembled = self.documents.save(assembled).await?;

        self.advance(
            assembly_id,
            AssemblyStatus::Completed,
            Some(&assembled.document_id),
        )
        .await
    }
}
