//! Policy validation of documents
//!
//! A [`DocumentPolicyValidation`] is the audit record of one document being
//! scored against one named policy:
//!
//! ```text
//! PENDING -> IN_PROGRESS -> PASSED
//!                        -> FAILED
//!                        -> TRANSFORMATION_COMPLETE -> PASSED | FAILED
//! FAILED (no transform)  -> TRANSFORMATION_COMPLETE
//! ```
//!
//! Scores recorded after a transform is attached belong to the transformed
//! document and land in the post-transform list. Whether a set of scores
//! passes is decided by a pluggable [`ScoringPolicy`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::document::{DerivedContent, Document, DocumentRepository, DocumentStatus};
use crate::error::{DocstoreError, EntityKind, Result};
use crate::id::{DocumentId, IdGenerator, IdKind, ValidationId};
use crate::record::{RecordStore, next_timestamp};

/// Flat status of a validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationStatus {
    Pending,
    InProgress,
    TransformationComplete,
    Passed,
    Failed,
}

impl ValidationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ValidationStatus::Passed | ValidationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "PENDING",
            ValidationStatus::InProgress => "IN_PROGRESS",
            ValidationStatus::TransformationComplete => "TRANSFORMATION_COMPLETE",
            ValidationStatus::Passed => "PASSED",
            ValidationStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation state; terminal variants carry their completion time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationState {
    Pending,
    InProgress {
        /// Id reserved for the transformed document
        #[serde(default, skip_serializing_if = "Option::is_none")]
        planned_transform: Option<DocumentId>,
    },
    TransformationComplete,
    Passed {
        #[serde(with = "time::serde::rfc3339")]
        completed_at: OffsetDateTime,
    },
    Failed {
        #[serde(with = "time::serde::rfc3339")]
        completed_at: OffsetDateTime,
    },
}

impl ValidationState {
    pub fn status(&self) -> ValidationStatus {
        match self {
            ValidationState::Pending => ValidationStatus::Pending,
            ValidationState::InProgress { .. } => ValidationStatus::InProgress,
            ValidationState::TransformationComplete => ValidationStatus::TransformationComplete,
            ValidationState::Passed { .. } => ValidationStatus::Passed,
            ValidationState::Failed { .. } => ValidationStatus::Failed,
        }
    }
}

/// Score produced by one named check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationScore {
    pub check_name: String,
    pub score: f64,
}

impl ValidationScore {
    pub fn new(check_name: impl Into<String>, score: f64) -> Self {
        Self {
            check_name: check_name.into(),
            score,
        }
    }
}

/// A document produced from the one under validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub transformed_document_id: DocumentId,

    #[serde(with = "time::serde::rfc3339")]
    pub attached_at: OffsetDateTime,

    /// Scores of the transformed document, in execution order
    pub post_transform_validation_scores: Vec<ValidationScore>,
}

/// Audit record of one policy validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPolicyValidation {
    validation_id: ValidationId,
    input_document_id: DocumentId,
    policy_id: String,
    state: ValidationState,
    validation_scores: Vec<ValidationScore>,
    transform: Option<Transform>,
    #[serde(with = "time::serde::rfc3339")]
    started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl DocumentPolicyValidation {
    /// New record in PENDING
    pub fn new(
        validation_id: ValidationId,
        input_document_id: DocumentId,
        policy_id: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            validation_id,
            input_document_id,
            policy_id: policy_id.into(),
            state: ValidationState::Pending,
            validation_scores: Vec::new(),
            transform: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn validation_id(&self) -> &ValidationId {
        &self.validation_id
    }

    pub fn input_document_id(&self) -> &DocumentId {
        &self.input_document_id
    }

    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    pub fn state(&self) -> &ValidationState {
        &self.state
    }

    pub fn status(&self) -> ValidationStatus {
        self.state.status()
    }

    /// Final outcome; `Some` exactly when the status is terminal
    pub fn passed(&self) -> Option<bool> {
        match self.state {
            ValidationState::Passed { .. } => Some(true),
            ValidationState::Failed { .. } => Some(false),
            _ => None,
        }
    }

    pub fn completed_at(&self) -> Option<OffsetDateTime> {
        match self.state {
            ValidationState::Passed { completed_at } | ValidationState::Failed { completed_at } => {
                Some(completed_at)
            }
            _ => None,
        }
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    pub fn validation_scores(&self) -> &[ValidationScore] {
        &self.validation_scores
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    pub fn transformed_document_id(&self) -> Option<&DocumentId> {
        self.transform.as_ref().map(|t| &t.transformed_document_id)
    }

    /// Post-transform scores; empty when no transform is attached
    pub fn post_transform_validation_scores(&self) -> &[ValidationScore] {
        self.transform
            .as_ref()
            .map(|t| t.post_transform_validation_scores.as_slice())
            .unwrap_or(&[])
    }

    /// Scores of the document currently being evaluated
    pub fn active_scores(&self) -> &[ValidationScore] {
        match &self.transform {
            Some(t) => &t.post_transform_validation_scores,
            None => &self.validation_scores,
        }
    }

    /// Document currently being evaluated
    pub fn active_document_id(&self) -> &DocumentId {
        self.transformed_document_id()
            .unwrap_or(&self.input_document_id)
    }

    fn rejected(&self, to: &str, reason: impl Into<String>) -> DocstoreError {
        DocstoreError::invalid_transition(
            EntityKind::Validation,
            self.validation_id.as_str(),
            self.status().as_str(),
            to,
            reason,
        )
    }

    /// PENDING -> IN_PROGRESS; no change otherwise
    pub fn begin(&mut self) -> bool {
        if self.state == ValidationState::Pending {
            self.state = ValidationState::InProgress {
                planned_transform: None,
            };
            true
        } else {
            false
        }
    }

    /// Append a score to the active list; returns whether anything changed
    pub fn record_score(&mut self, check_name: &str, score: f64) -> Result<bool> {
        if !score.is_finite() {
            return Err(DocstoreError::InvalidInput(format!(
                "score for check '{}' must be finite, got {}",
                check_name, score
            )));
        }

        if self.status().is_terminal() {
            return Err(self.rejected(
                self.status().as_str(),
                format!("cannot record score '{}' on a completed validation", check_name),
            ));
        }

        if let Some(existing) = self.active_scores().iter().find(|s| s.check_name == check_name) {
            if existing.score == score {
                return Ok(false);
            }
            return Err(self.rejected(
                self.status().as_str(),
                format!(
                    "check '{}' already scored {}, refusing {}",
                    check_name, existing.score, score
                ),
            ));
        }

        self.begin();
        let entry = ValidationScore::new(check_name, score);
        match &mut self.transform {
            Some(t) => t.post_transform_validation_scores.push(entry),
            None => self.validation_scores.push(entry),
        }
        Ok(true)
    }

    /// Move to PASSED or FAILED; returns whether anything changed
    pub fn complete(&mut self, passed: bool) -> Result<bool> {
        let target = if passed {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        };

        match self.passed() {
            Some(current) if current == passed => Ok(false),
            Some(_) => Err(self.rejected(target.as_str(), "validation already completed with a different outcome")),
            None => {
                let completed_at = OffsetDateTime::now_utc();
                self.state = if passed {
                    ValidationState::Passed { completed_at }
                } else {
                    ValidationState::Failed { completed_at }
                };
                Ok(true)
            }
        }
    }

    /// Record a transformed document and reopen evaluation against it
    pub fn attach_transform(&mut self, transformed_document_id: DocumentId) -> Result<bool> {
        let to = ValidationStatus::TransformationComplete.as_str();

        if let Some(existing) = &self.transform {
            if existing.transformed_document_id == transformed_document_id {
                return Ok(false);
            }
            return Err(self.rejected(
                to,
                format!(
                    "transform {} already attached, refusing {}",
                    existing.transformed_document_id, transformed_document_id
                ),
            ));
        }

        if self.status() == ValidationStatus::Passed {
            return Err(self.rejected(to, "a passed validation cannot be transformed"));
        }
        if let Some(planned) = self.planned_transform() {
            if planned != &transformed_document_id {
                return Err(self.rejected(
                    to,
                    format!(
                        "transform {} is reserved, refusing {}",
                        planned, transformed_document_id
                    ),
                ));
            }
        }

        self.transform = Some(Transform {
            transformed_document_id,
            attached_at: OffsetDateTime::now_utc(),
            post_transform_validation_scores: Vec::new(),
        });
        self.state = ValidationState::TransformationComplete;
        Ok(true)
    }

    /// Id reserved for the transformed document while IN_PROGRESS
    pub fn planned_transform(&self) -> Option<&DocumentId> {
        match &self.state {
            ValidationState::InProgress { planned_transform } => planned_transform.as_ref(),
            _ => None,
        }
    }

    /// Reserve `transformed_document_id` for the transform about to be made
    ///
    /// An earlier reservation wins and nothing changes.
    pub fn plan_transform(&mut self, transformed_document_id: DocumentId) -> Result<bool> {
        if self.transform.is_none() {
            if let ValidationState::InProgress { planned_transform } = &mut self.state {
                if planned_transform.is_some() {
                    return Ok(false);
                }
                *planned_transform = Some(transformed_document_id);
                return Ok(true);
            }
        }
        Err(self.rejected(
            ValidationStatus::TransformationComplete.as_str(),
            "a transform can only be planned while in progress",
        ))
    }
}

/// Decides whether a set of scores passes a policy
pub trait ScoringPolicy: Send + Sync {
    fn passes(&self, scores: &[ValidationScore]) -> bool;
}

/// Every check must reach the threshold; no scores never passes
#[derive(Debug, Clone, Copy)]
pub struct MinimumScore(pub f64);

impl ScoringPolicy for MinimumScore {
    fn passes(&self, scores: &[ValidationScore]) -> bool {
        !scores.is_empty() && scores.iter().all(|s| s.score >= self.0)
    }
}

/// The mean of all checks must reach the threshold
#[derive(Debug, Clone, Copy)]
pub struct MeanScore(pub f64);

impl ScoringPolicy for MeanScore {
    fn passes(&self, scores: &[ValidationScore]) -> bool {
        if scores.is_empty() {
            return false;
        }
        let mean = scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64;
        mean >= self.0
    }
}

/// One scoring check of a policy
#[async_trait]
pub trait PolicyCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, document: &Document) -> Result<f64>;
}

/// Produces a new document from one that failed validation
#[async_trait]
pub trait DocumentTransformer: Send + Sync {
    async fn transform(&self, document: &Document) -> Result<DerivedContent>;
}

/// Checks, scoring rule and optional transformer behind a policy id
pub struct PolicyDefinition {
    policy_id: String,
    checks: Vec<Box<dyn PolicyCheck>>,
    scoring: Box<dyn ScoringPolicy>,
    transformer: Option<Box<dyn DocumentTransformer>>,
}

impl PolicyDefinition {
    pub fn new(policy_id: impl Into<String>, scoring: impl ScoringPolicy + 'static) -> Self {
        Self {
            policy_id: policy_id.into(),
            checks: Vec::new(),
            scoring: Box::new(scoring),
            transformer: None,
        }
    }

    pub fn with_check(mut self, check: impl PolicyCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn with_transformer(mut self, transformer: impl DocumentTransformer + 'static) -> Self {
        self.transformer = Some(Box::new(transformer));
        self
    }

    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    pub fn passes(&self, scores: &[ValidationScore]) -> bool {
        self.scoring.passes(scores)
    }
}

/// Runs and records policy validations
#[derive(Clone)]
pub struct PolicyValidationEngine {
    records: RecordStore<DocumentPolicyValidation>,
    documents: Arc<dyn DocumentRepository>,
    ids: Arc<dyn IdGenerator>,
}

impl PolicyValidationEngine {
    pub(crate) fn new(
        records: RecordStore<DocumentPolicyValidation>,
        documents: Arc<dyn DocumentRepository>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            records,
            documents,
            ids,
        }
    }

    /// Begin validating a document against a policy
    ///
    /// Re-delivery with the same document and policy returns the id of the
    /// existing validation instead of creating another record.
    pub async fn start(&self, input_document_id: &DocumentId, policy_id: &str) -> Result<ValidationId> {
        if !self.documents.exists(input_document_id).await? {
            return Err(DocstoreError::not_found(
                EntityKind::Document,
                input_document_id.as_str(),
            ));
        }

        let key = [input_document_id.as_str(), policy_id];
        let validation_id = match self.records.lookup_index(&key).await? {
            Some(existing) => {
                let existing = ValidationId(existing);
                if self.records.exists(existing.as_str()).await? {
                    debug!(
                        "Validation {} already started for {} / {}",
                        existing, input_document_id, policy_id
                    );
                    return Ok(existing);
                }
                existing
            }
            None => {
                let id = ValidationId(self.ids.generate(IdKind::Validation));
                // Index before record, so a retry after a partial write reuses the id
                self.records.write_index(&key, id.as_str()).await?;
                id
            }
        };

        let mut record = DocumentPolicyValidation::new(
            validation_id.clone(),
            input_document_id.clone(),
            policy_id,
        );
        record.begin();
        self.records.store(validation_id.as_str(), &record).await?;

        info!(
            "Started validation {} of document {} against policy {}",
            validation_id, input_document_id, policy_id
        );
        Ok(validation_id)
    }

    /// Load a validation record
    pub async fn get(&self, validation_id: &ValidationId) -> Result<Option<DocumentPolicyValidation>> {
        self.records.load(validation_id.as_str()).await
    }

    async fn require(&self, validation_id: &ValidationId) -> Result<DocumentPolicyValidation> {
        self.get(validation_id).await?.ok_or_else(|| {
            DocstoreError::not_found(EntityKind::Validation, validation_id.as_str())
        })
    }

    /// Re-read persisted state, apply `change`, and write back only if it changed
    async fn update<F>(&self, validation_id: &ValidationId, change: F) -> Result<DocumentPolicyValidation>
    where
        F: FnOnce(&mut DocumentPolicyValidation) -> Result<bool>,
    {
        let mut record = self.require(validation_id).await?;
        let before = record.status();

        let changed = change(&mut record).inspect_err(|e| {
            warn!("Rejected change to validation {}: {}", validation_id, e);
        })?;

        if changed {
            record.updated_at = next_timestamp(record.updated_at);
            self.records.store(validation_id.as_str(), &record).await?;
            if before != record.status() {
                info!("Validation {}: {} -> {}", validation_id, before, record.status());
            }
        }
        Ok(record)
    }

    /// Append a check score, in execution order
    pub async fn record_score(
        &self,
        validation_id: &ValidationId,
        check_name: &str,
        score: f64,
    ) -> Result<DocumentPolicyValidation> {
        self.update(validation_id, |record| record.record_score(check_name, score))
            .await
    }

    /// Set the final outcome
    pub async fn complete(&self, validation_id: &ValidationId, passed: bool) -> Result<DocumentPolicyValidation> {
        self.update(validation_id, |record| record.complete(passed)).await
    }

    /// Record that a transformed document was produced from the input
    pub async fn attach_transform(
        &self,
        validation_id: &ValidationId,
        transformed_document_id: &DocumentId,
    ) -> Result<DocumentPolicyValidation> {
        if !self.documents.exists(transformed_document_id).await? {
            return Err(DocstoreError::not_found(
                EntityKind::Document,
                transformed_document_id.as_str(),
            ));
        }

        self.update(validation_id, |record| {
            record.attach_transform(transformed_document_id.clone())
        })
        .await
    }

    /// Complete using a scoring policy over the active scores
    pub async fn evaluate(
        &self,
        validation_id: &ValidationId,
        scoring: &dyn ScoringPolicy,
    ) -> Result<DocumentPolicyValidation> {
        self.update(validation_id, |record| {
            let passed = scoring.passes(record.active_scores());
            record.complete(passed)
        })
        .await
    }

    /// Drive a validation through the whole pipeline
    ///
    /// Scores already recorded are not re-run, so a retry after a failure
    /// resumes where the previous attempt stopped. At most one transform is
    /// attempted. A completed validation is returned unchanged.
    pub async fn run(
        &self,
        validation_id: &ValidationId,
        policy: &PolicyDefinition,
    ) -> Result<DocumentPolicyValidation> {
        let mut record = self.require(validation_id).await?;

        if record.policy_id() != policy.policy_id() {
            return Err(DocstoreError::InvalidInput(format!(
                "validation {} is for policy {}, not {}",
                validation_id,
                record.policy_id(),
                policy.policy_id()
            )));
        }

        if record.status().is_terminal() {
            return Ok(record);
        }

        if record.transform().is_none() {
            let input = self.documents.require(record.input_document_id()).await?;
            record = self.score_document(validation_id, &record, &input, policy).await?;

            if policy.passes(record.active_scores()) {
                return self.finish(validation_id, input, true).await;
            }

            let Some(transformer) = &policy.transformer else {
                return self.finish(validation_id, input, false).await;
            };

            let candidate = self.documents.generate_id();
            record = self
                .update(validation_id, |record| record.plan_transform(candidate))
                .await?;
            let transformed_id = record.planned_transform().cloned().ok_or_else(|| {
                DocstoreError::Pipeline(format!(
                    "validation {} has no planned transform",
                    validation_id
                ))
            })?;

            if self.documents.exists(&transformed_id).await? {
                debug!(
                    "Validation {}: transform {} already saved",
                    validation_id, transformed_id
                );
            } else {
                let output = transformer.transform(&input).await?;
                let transformed = Document::derived(
                    transformed_id.clone(),
                    &input.document_id,
                    output,
                    DocumentStatus::Transformed,
                );
                self.documents.save(transformed).await?;

                info!(
                    "Validation {}: document {} transformed into {}",
                    validation_id, input.document_id, transformed_id
                );
            }
            record = self.attach_transform(validation_id, &transformed_id).await?;
        }

        let transformed = self.documents.require(record.active_document_id()).await?;
        record = self
            .score_document(validation_id, &record, &transformed, policy)
            .await?;
        let passed = policy.passes(record.active_scores());
        self.finish(validation_id, transformed, passed).await
    }

    async fn score_document(
        &self,
        validation_id: &ValidationId,
        record: &DocumentPolicyValidation,
        document: &Document,
        policy: &PolicyDefinition,
    ) -> Result<DocumentPolicyValidation> {
        let mut record = record.clone();
        for check in &policy.checks {
            if record
                .active_scores()
                .iter()
                .any(|s| s.check_name == check.name())
            {
                continue;
            }
            let score = check.score(document).await?;
            debug!(
                "Validation {}: check {} scored {} on {}",
                validation_id,
                check.name(),
                score,
                document.document_id
            );
            record = self.record_score(validation_id, check.name(), score).await?;
        }
        Ok(record)
    }

    async fn finish(
        &self,
        validation_id: &ValidationId,
        document: Document,
        passed: bool,
    ) -> Result<DocumentPolicyValidation> {
        let status = if passed {
            DocumentStatus::Validated
        } else {
            DocumentStatus::Rejected
        };
        // Document first: a terminal record is never revisited by `run`
        if document.status != status {
            self.documents.save(document.with_status(status)).await?;
        }

        self.complete(validation_id, passed).await

    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DocumentPolicyValidation {
        let mut record = DocumentPolicyValidation::new("val_1".into(), "doc_a".into(), "policy-p");
        record.begin();
        record
    }

    #[test]
    fn test_passed_only_when_terminal() {
        let mut record = record();
        assert_eq!(record.status(), ValidationStatus::InProgress);
        assert_eq!(record.passed(), None);
        assert_eq!(record.completed_at(), None);

        assert!(record.complete(true).unwrap());
        assert_eq!(record.passed(), Some(true));
        assert!(record.completed_at().is_some());
    }

    #[test]
    fn test_recomplete_same_outcome_is_noop() {
        let mut record = record();
        record.complete(false).unwrap();
        let completed_at = record.completed_at();

        assert!(!record.complete(false).unwrap());
        assert_eq!(record.completed_at(), completed_at);

        let err = record.complete(true).unwrap_err();
        assert!(matches!(err, DocstoreError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_scores_keep_insertion_order_and_reject_conflicts() {
        let mut record = record();
        record.record_score("zeta", 70.0).unwrap();
        record.record_score("alpha", 85.0).unwrap();

        // re-delivery of the same score
        assert!(!record.record_score("zeta", 70.0).unwrap());
        assert!(record.record_score("zeta", 71.0).is_err());
        assert!(record.record_score("nan", f64::NAN).is_err());

        let names: Vec<_> = record
            .validation_scores()
            .iter()
            .map(|s| s.check_name.as_str())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_scores_after_transform_go_to_post_list() {
        let mut record = record();
        record.record_score("quality", 40.0).unwrap();
        record.complete(false).unwrap();
        assert!(record.record_score("late", 1.0).is_err());

        assert!(record.attach_transform("doc_c".into()).unwrap());
        assert_eq!(record.status(), ValidationStatus::TransformationComplete);
        assert_eq!(record.passed(), None);

        // same check name is allowed again for the transformed document
        record.record_score("quality", 90.0).unwrap();
        assert_eq!(record.validation_scores().len(), 1);
        assert_eq!(record.post_transform_validation_scores()[0].score, 90.0);
        assert_eq!(record.active_document_id().as_str(), "doc_c");
    }

    #[test]
    fn test_attach_transform_rules() {
        let mut passed = record();
        passed.complete(true).unwrap();
        assert!(passed.attach_transform("doc_c".into()).is_err());

        let mut record = record();
        record.attach_transform("doc_c".into()).unwrap();
        assert!(!record.attach_transform("doc_c".into()).unwrap());
        assert!(record.attach_transform("doc_d".into()).is_err());
    }

    #[test]
    fn test_planned_transform_is_reused() {
        let mut pending = DocumentPolicyValidation::new("val_2".into(), "doc_a".into(), "policy-p");
        assert!(pending.plan_transform("doc_c".into()).is_err());

        let mut record = record();
        assert!(record.plan_transform("doc_c".into()).unwrap());
        assert!(!record.plan_transform("doc_d".into()).unwrap());
        assert_eq!(record.planned_transform().map(|d| d.as_str()), Some("doc_c"));
        assert_eq!(record.status(), ValidationStatus::InProgress);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["state"]["planned_transform"], "doc_c");
        let back: DocumentPolicyValidation = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);

        assert!(record.attach_transform("doc_d".into()).is_err());
        assert!(record.attach_transform("doc_c".into()).unwrap());
        assert!(record.planned_transform().is_none());
        assert!(record.plan_transform("doc_e".into()).is_err());
    }

    #[test]
    fn test_failed_without_transform_is_distinguishable() {
        let mut no_path = record();
        no_path.complete(false).unwrap();

        let mut transform_failed = record();
        transform_failed.attach_transform("doc_c".into()).unwrap();
        transform_failed.record_score("quality", 10.0).unwrap();
        transform_failed.complete(false).unwrap();

        assert_eq!(no_path.status(), transform_failed.status());
        assert!(no_path.transformed_document_id().is_none());
        assert!(transform_failed.transformed_document_id().is_some());
    }

    #[test]
    fn test_state_serialization() {
        let mut record = record();
        record.complete(true).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["state"]["status"], "PASSED");
        assert!(json["state"]["completed_at"].is_string());

        let back: DocumentPolicyValidation = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_scoring_policies() {
        let scores = vec![ValidationScore::new("a", 70.0), ValidationScore::new("b", 85.0)];

        assert!(MinimumScore(70.0).passes(&scores));
        assert!(!MinimumScore(80.0).passes(&scores));
        assert!(!MinimumScore(0.0).passes(&[]));

        assert!(MeanScore(77.5).passes(&scores));
        assert!(!MeanScore(78.0).passes(&scores));
        assert!(!MeanScore(0.0).passes(&[]));
    }
}
