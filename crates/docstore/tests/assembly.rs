//! Assembly coordination

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use common::FailingStorage;
use docstore::*;

fn store() -> (Arc<MemoryStorage>, Docstore) {
    let storage = Arc::new(MemoryStorage::new());
    let store = Docstore::with_storage(storage.clone(), StoreConfig::default());
    (storage, store)
}

async fn input_document(store: &Docstore) -> Document {
    store
        .documents()
        .save(Document::new("doc_input", "claim.txt", "text/plain").with_content("claim body"))
        .await
        .unwrap()
}

fn assert_output_iff_completed(assembly: &Assembly) {
    assert_eq!(
        assembly.assembled_document_id().is_some(),
        assembly.status() == AssemblyStatus::Completed
    );
}

struct PacketAssembler;

#[async_trait]
impl Assembler for PacketAssembler {
    async fn assemble(&self, assembly: &Assembly, input: &Document) -> Result<DerivedContent> {
        let mut packet = format!("[{}]\n", assembly.assembly_specification_id()).into_bytes();
        packet.extend_from_slice(input.content().map(|c| &c[..]).unwrap_or_default());
        Ok(DerivedContent {
            content: Bytes::from(packet),
            content_type: "text/plain".into(),
            original_filename: "packet.txt".into(),
        })
    }
}

struct BrokenAssembler(fn() -> DocstoreError);

#[async_trait]
impl Assembler for BrokenAssembler {
    async fn assemble(&self, _assembly: &Assembly, _input: &Document) -> Result<DerivedContent> {
        Err((self.0)())
    }
}

#[tokio::test]
async fn test_complete_once_then_noop_or_reject() {
    let (storage, store) = store();
    let input = input_document(&store).await;
    let coordinator = store.assemblies();

    let id = coordinator
        .create("spec-s", &input.document_id, "wf-1")
        .await
        .unwrap();
    assert!(id.as_str().starts_with("asm_"));
    let pending = coordinator.get(&id).await.unwrap().unwrap();
    assert_eq!(pending.status(), AssemblyStatus::Pending);
    assert_output_iff_completed(&pending);

    let running = coordinator
        .advance(&id, AssemblyStatus::InProgress, None)
        .await
        .unwrap();
    assert_output_iff_completed(&running);
    assert!(running.updated_at() > pending.updated_at());

    let x = DocumentId::from("X");
    let completed = coordinator
        .advance(&id, AssemblyStatus::Completed, Some(&x))
        .await
        .unwrap();
    assert_eq!(completed.assembled_document_id(), Some(&x));
    assert_output_iff_completed(&completed);

    let writes = storage.write_count();
    let again = coordinator
        .advance(&id, AssemblyStatus::Completed, Some(&x))
        .await
        .unwrap();
    assert_eq!(again, completed);
    assert_eq!(storage.write_count(), writes);

    let err = coordinator
        .advance(&id, AssemblyStatus::Completed, Some(&"Y".into()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DocstoreError::InvalidStateTransition {
            kind: EntityKind::Assembly,
            ..
        }
    ));

    let stored = coordinator.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.assembled_document_id(), Some(&x));
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let (storage, store) = store();
    let input = input_document(&store).await;
    let coordinator = store.assemblies();

    let first = coordinator.create("spec-s", &input.document_id, "wf-1").await.unwrap();
    let second = coordinator.create("spec-s", &input.document_id, "wf-1").await.unwrap();
    let other_workflow = coordinator.create("spec-s", &input.document_id, "wf-2").await.unwrap();

    assert_eq!(first, second);
    assert_ne!(first, other_workflow);
    let records = storage
        .keys("docstore-metadata")
        .into_iter()
        .filter(|key| key.starts_with("assemblies/"))
        .count();
    assert_eq!(records, 2);
}

#[tokio::test]
async fn test_racing_completions_see_persisted_state() {
    let (_, store) = store();
    let input = input_document(&store).await;
    let first = store.assemblies().clone();
    let second = store.assemblies().clone();

    let id = first.create("spec-s", &input.document_id, "wf-1").await.unwrap();
    let stale = second.get(&id).await.unwrap().unwrap();
    assert_eq!(stale.status(), AssemblyStatus::Pending);

    first
        .advance(&id, AssemblyStatus::Completed, Some(&"X".into()))
        .await
        .unwrap();
    let err = second
        .advance(&id, AssemblyStatus::Completed, Some(&"Y".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, DocstoreError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_failed_assembly_has_no_output() {
    let (_, store) = store();
    let input = input_document(&store).await;
    let coordinator = store.assemblies();
    let id = coordinator.create("spec-s", &input.document_id, "wf-1").await.unwrap();

    let failed = coordinator.fail(&id, "template missing").await.unwrap();
    assert_eq!(failed.status(), AssemblyStatus::Failed);
    assert_eq!(failed.failure_reason(), Some("template missing"));
    assert_output_iff_completed(&failed);

    assert!(
        coordinator
            .advance(&id, AssemblyStatus::Completed, Some(&"X".into()))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_advance_unknown_assembly() {
    let (_, store) = store();
    let err = store
        .assemblies()
        .advance(&"asm_missing".into(), AssemblyStatus::InProgress, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DocstoreError::NotFound {
            kind: EntityKind::Assembly,
            ..
        }
    ));
    assert!(store.assemblies().get(&"asm_missing".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_run_saves_assembled_document() {
    let (_, store) = store();
    let input = input_document(&store).await;
    let coordinator = store.assemblies();
    let id = coordinator.create("spec-s", &input.document_id, "wf-1").await.unwrap();

    let assembly = coordinator.run(&id, &PacketAssembler).await.unwrap();
    assert_eq!(assembly.status(), AssemblyStatus::Completed);

    let output_id = assembly.assembled_document_id().unwrap();
    let output = store.documents().require(output_id).await.unwrap();
    assert_eq!(output.status, DocumentStatus::Assembled);
    assert_eq!(output.derived_from.as_ref(), Some(&input.document_id));
    assert_eq!(&output.content().unwrap()[..], b"[spec-s]\nclaim body");

    let again = coordinator.run(&id, &PacketAssembler).await.unwrap();
    assert_eq!(again, assembly);
}

#[tokio::test]
async fn test_run_marks_permanent_failure() {
    let (_, store) = store();
    let input = input_document(&store).await;
    let coordinator = store.assemblies();
    let id = coordinator.create("spec-s", &input.document_id, "wf-1").await.unwrap();

    let assembler = BrokenAssembler(|| DocstoreError::Pipeline("unknown section".into()));
    let assembly = coordinator.run(&id, &assembler).await.unwrap();

    assert_eq!(assembly.status(), AssemblyStatus::Failed);
    assert!(assembly.failure_reason().unwrap().contains("unknown section"));
    assert_output_iff_completed(&assembly);
}

#[tokio::test]
async fn test_run_leaves_retryable_failure_in_progress() {
    let (_, store) = store();
    let input = input_document(&store).await;
    let coordinator = store.assemblies();
    let id = coordinator.create("spec-s", &input.document_id, "wf-1").await.unwrap();

    let assembler = BrokenAssembler(|| DocstoreError::Storage(StorageError::Backend("timeout".into())));
    let err = coordinator.run(&id, &assembler).await.unwrap_err();
    assert!(err.is_retryable());

    let assembly = coordinator.get(&id).await.unwrap().unwrap();
    assert_eq!(assembly.status(), AssemblyStatus::InProgress);

    let assembly = coordinator.run(&id, &PacketAssembler).await.unwrap();
    assert_eq!(assembly.status(), AssemblyStatus::Completed);
}

#[tokio::test]
async fn test_run_retry_after_lost_completion_reuses_output() {
    let memory = Arc::new(MemoryStorage::new());
    let failing = Arc::new(FailingStorage::new(memory.clone()));
    let store = Docstore::with_storage(failing.clone(), StoreConfig::default());
    let input = input_document(&store).await;
    let coordinator = store.assemblies();
    let id = coordinator.create("spec-s", &input.document_id, "wf-1").await.unwrap();

    // in progress, output reserved, then the completion write fails
    failing.fail_nth_put("docstore-metadata", "assemblies/", 3);
    let err = coordinator.run(&id, &PacketAssembler).await.unwrap_err();
    assert!(err.is_retryable());

    let stalled = coordinator.get(&id).await.unwrap().unwrap();
    assert_eq!(stalled.status(), AssemblyStatus::InProgress);
    let planned = stalled.planned_output().cloned().unwrap();
    assert!(store.documents().exists(&planned).await.unwrap());

    // the saved output is reused, so the assembler is not consulted again
    let assembler = BrokenAssembler(|| DocstoreError::Pipeline("must not run".into()));
    let assembly = coordinator.run(&id, &assembler).await.unwrap();
    assert_eq!(assembly.status(), AssemblyStatus::Completed);
    assert_eq!(assembly.assembled_document_id(), Some(&planned));
    assert_eq!(store.documents().list_ids().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_run_fails_when_input_missing() {
    let (_, store) = store();
    let coordinator = store.assemblies();
    let id = coordinator
        .create("spec-s", &"doc_gone".into(), "wf-1")
        .await
        .unwrap();

    let assembly = coordinator.run(&id, &PacketAssembler).await.unwrap();
    assert_eq!(assembly.status(), AssemblyStatus::Failed);
    assert!(assembly.failure_reason().unwrap().contains("doc_gone"));
}
