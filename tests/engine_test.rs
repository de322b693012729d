//! Task execution engine scenarios
//!
//! Every test runs the engine against in-memory object stores on both sides
//! and the in-memory coordinator, then inspects the stored files and the
//! recorded coordinator calls.

use bytes::Bytes;
use filesyncer::coordinator::{
    InMemoryCoordinator, NO_CHECKPOINT, Operation, OperationStatus, RecordedCall, Task,
    TaskCoordinator, UpdateJobBody,
};
use filesyncer::observability::Metrics;
use filesyncer::storage::{ObjectStoreProvider, ProviderPair, StorageError, StorageProvider};
use filesyncer::worker::{TaskEngine, TaskOutcome};
use serde_json::{Value, json};
use std::sync::Arc;

const MAX_ATTEMPTS: u32 = 3;
const JOB_TYPE: &str = "Ingestion_New";
const TASK_TYPE: &str = "Ingestion";

struct Harness {
    source: Arc<ObjectStoreProvider>,
    destination: Arc<ObjectStoreProvider>,
    coordinator: Arc<InMemoryCoordinator>,
    metrics: Arc<Metrics>,
    engine: TaskEngine,
}

impl Harness {
    fn new() -> Self {
        Self::with_stores(
            Arc::new(ObjectStoreProvider::in_memory()),
            Arc::new(ObjectStoreProvider::in_memory()),
        )
    }

    fn with_stores(source: Arc<ObjectStoreProvider>, destination: Arc<ObjectStoreProvider>) -> Self {
        let coordinator = Arc::new(InMemoryCoordinator::new());
        let metrics = Arc::new(Metrics::new());
        let engine = TaskEngine::new(
            ProviderPair::new(source.clone(), destination.clone()),
            coordinator.clone(),
            metrics.clone(),
            MAX_ATTEMPTS,
        );

        Self {
            source,
            destination,
            coordinator,
            metrics,
            engine,
        }
    }

    async fn seed(&self, keys: &[&str]) {
        for key in keys {
            self.source
                .post_file(key, Bytes::from(format!("content of {}", key)))
                .await
                .unwrap();
        }
    }

    /// Enqueue then dequeue, as the pool would
    async fn take(&self, job_type: &str, task_type: &str, parameters: Value, attempts: u32) -> Task {
        self.coordinator
            .enqueue(job_type, task_type, parameters, attempts)
            .await;
        self.coordinator
            .dequeue(job_type, task_type)
            .await
            .unwrap()
            .unwrap()
    }

    async fn ingestion(&self, parameters: Value, attempts: u32) -> Task {
        self.take(JOB_TYPE, TASK_TYPE, parameters, attempts).await
    }

    /// Recorded calls after the initial enqueue/dequeue
    async fn engine_calls(&self) -> Vec<RecordedCall> {
        self.coordinator
            .calls()
            .await
            .into_iter()
            .filter(|call| !matches!(call, RecordedCall::Dequeue { .. }))
            .collect()
    }
}

fn ingestion_params(paths: &[&str], model_id: &str, last_index_error: i64) -> Value {
    json!({
        "paths": paths,
        "modelId": model_id,
        "lastIndexError": last_index_error,
    })
}

#[tokio::test]
async fn test_full_transfer_acks_and_clears_parameters() {
    let h = Harness::new();
    h.seed(&["m/a.txt", "m/b.txt"]).await;

    let task = h
        .ingestion(ingestion_params(&["m/a.txt", "m/b.txt"], "m2", NO_CHECKPOINT), 0)
        .await;

    let outcome = h.engine.handle_task(&task).await;
    assert_eq!(outcome, TaskOutcome::Acked);

    assert_eq!(
        h.destination.get_file("m2/a.txt").await.unwrap(),
        Bytes::from("content of m/a.txt")
    );
    assert_eq!(
        h.destination.get_file("m2/b.txt").await.unwrap(),
        Bytes::from("content of m/b.txt")
    );
    assert!(matches!(
        h.destination.get_file("m/a.txt").await,
        Err(StorageError::NotFound(_))
    ));

    assert_eq!(
        h.engine_calls().await,
        vec![
            RecordedCall::Ack {
                job_id: task.job_id.clone(),
                task_id: task.id.clone(),
            },
            RecordedCall::UpdateParameters {
                job_id: task.job_id.clone(),
                task_id: task.id.clone(),
                parameters: json!({"modelId": "m2", "lastIndexError": -1}),
            },
            RecordedCall::ProgressJob {
                job_id: task.job_id.clone(),
            },
        ]
    );
    assert_eq!(
        h.coordinator.job_progress(&task.job_id).await,
        Some(UpdateJobBody {
            percentage: Some(100),
            status: Some(OperationStatus::Completed),
        })
    );

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.tasks_acked, 1);
    assert_eq!(snapshot.files_transferred, 2);
}

#[tokio::test]
async fn test_missing_source_file_checkpoints_and_rejects() {
    let h = Harness::new();
    h.seed(&["m/a.txt"]).await;

    let task = h
        .ingestion(ingestion_params(&["m/a.txt", "m/b.txt"], "m2", NO_CHECKPOINT), 0)
        .await;

    let outcome = h.engine.handle_task(&task).await;
    assert_eq!(outcome, TaskOutcome::Rejected { recoverable: true });

    assert!(h.destination.get_file("m2/a.txt").await.is_ok());

    let calls = h.engine_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0],
        RecordedCall::UpdateParameters {
            job_id: task.job_id.clone(),
            task_id: task.id.clone(),
            parameters: ingestion_params(&["m/a.txt", "m/b.txt"], "m2", 1),
        }
    );
    assert_eq!(
        calls[1],
        RecordedCall::Reject {
            job_id: task.job_id.clone(),
            task_id: task.id.clone(),
            recoverable: true,
            reason: StorageError::NotFound("m/b.txt".to_string()).to_string(),
        }
    );
    assert!(!calls.iter().any(|c| matches!(c, RecordedCall::Ack { .. })));
}

#[tokio::test]
async fn test_failure_at_first_file_writes_nothing() {
    let h = Harness::new();
    h.seed(&["m/b.txt"]).await;

    let task = h
        .ingestion(ingestion_params(&["m/a.txt", "m/b.txt"], "m2", NO_CHECKPOINT), 0)
        .await;

    h.engine.handle_task(&task).await;

    assert!(h.destination.get_file("m2/b.txt").await.is_err());
    let stored = h.coordinator.task(&task.id).await.unwrap();
    assert_eq!(stored.parameters["lastIndexError"], json!(0));
}

#[tokio::test]
async fn test_resume_starts_at_checkpoint() {
    let h = Harness::new();
    // m/a.txt is absent: reading it would fail the task
    h.seed(&["m/b.txt", "m/c.txt"]).await;

    let task = h
        .ingestion(
            ingestion_params(&["m/a.txt", "m/b.txt", "m/c.txt"], "m2", 1),
            1,
        )
        .await;

    let outcome = h.engine.handle_task(&task).await;
    assert_eq!(outcome, TaskOutcome::Acked);

    assert!(h.destination.get_file("m2/a.txt").await.is_err());
    assert!(h.destination.get_file("m2/b.txt").await.is_ok());
    assert!(h.destination.get_file("m2/c.txt").await.is_ok());
    assert_eq!(h.metrics.snapshot().files_transferred, 2);
}

#[tokio::test]
async fn test_redelivered_task_resumes_where_it_failed() {
    let h = Harness::new();
    h.seed(&["m/a.txt"]).await;

    let task = h
        .ingestion(ingestion_params(&["m/a.txt", "m/b.txt"], "m2", NO_CHECKPOINT), 0)
        .await;
    assert_eq!(
        h.engine.handle_task(&task).await,
        TaskOutcome::Rejected { recoverable: true }
    );

    // Second attempt reads from a source holding only the missing file
    let retry_source = Arc::new(ObjectStoreProvider::in_memory());
    retry_source
        .post_file("m/b.txt", Bytes::from("late"))
        .await
        .unwrap();
    let retry_engine = TaskEngine::new(
        ProviderPair::new(retry_source, h.destination.clone()),
        h.coordinator.clone(),
        h.metrics.clone(),
        MAX_ATTEMPTS,
    );

    let redelivered = h
        .coordinator
        .dequeue(JOB_TYPE, TASK_TYPE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(redelivered.id, task.id);
    assert_eq!(redelivered.attempts, 1);
    assert_eq!(redelivered.parameters["lastIndexError"], json!(1));

    assert_eq!(
        retry_engine.handle_task(&redelivered).await,
        TaskOutcome::Acked
    );
    assert_eq!(
        h.destination.get_file("m2/b.txt").await.unwrap(),
        Bytes::from("late")
    );
}

#[tokio::test]
async fn test_recoverability_threshold() {
    for (attempts, recoverable) in [
        (MAX_ATTEMPTS - 1, true),
        (MAX_ATTEMPTS, false),
        (MAX_ATTEMPTS + 1, false),
    ] {
        let h = Harness::new();
        let task = h
            .ingestion(ingestion_params(&["m/missing.txt"], "m2", NO_CHECKPOINT), attempts)
            .await;

        let outcome = h.engine.handle_task(&task).await;
        assert_eq!(
            outcome,
            TaskOutcome::Rejected { recoverable },
            "attempts = {}",
            attempts
        );
    }
}

#[tokio::test]
async fn test_checkpoint_failure_drops_task_without_reject() {
    let h = Harness::new();
    let task = h
        .ingestion(ingestion_params(&["m/missing.txt"], "m2", NO_CHECKPOINT), 0)
        .await;
    h.coordinator.fail_on(Operation::UpdateParameters).await;

    let outcome = h.engine.handle_task(&task).await;
    assert_eq!(outcome, TaskOutcome::Dropped);

    let calls = h.engine_calls().await;
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], RecordedCall::UpdateParameters { .. }));
    assert_eq!(
        calls[1],
        RecordedCall::Release {
            task_id: task.id.clone(),
        }
    );
    assert_eq!(h.metrics.snapshot().tasks_dropped, 1);
}

#[tokio::test]
async fn test_reject_failure_is_swallowed() {
    let h = Harness::new();
    let task = h
        .ingestion(ingestion_params(&["m/missing.txt"], "m2", NO_CHECKPOINT), 0)
        .await;
    h.coordinator.fail_on(Operation::Reject).await;

    assert_eq!(h.engine.handle_task(&task).await, TaskOutcome::Dropped);
    assert!(h.engine_calls().await.contains(&RecordedCall::Release {
        task_id: task.id.clone(),
    }));
}

#[tokio::test]
async fn test_ack_failure_skips_cleanup() {
    let h = Harness::new();
    h.seed(&["m/a.txt"]).await;
    let task = h
        .ingestion(ingestion_params(&["m/a.txt"], "m2", NO_CHECKPOINT), 0)
        .await;
    h.coordinator.fail_on(Operation::Ack).await;

    let outcome = h.engine.handle_task(&task).await;
    assert_eq!(outcome, TaskOutcome::Dropped);

    let calls = h.engine_calls().await;
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], RecordedCall::Ack { .. }));
    assert!(matches!(calls[1], RecordedCall::Release { .. }));
}

#[tokio::test]
async fn test_cleanup_failure_still_acks() {
    let h = Harness::new();
    h.seed(&["m/a.txt"]).await;
    let task = h
        .ingestion(ingestion_params(&["m/a.txt"], "m2", NO_CHECKPOINT), 0)
        .await;
    h.coordinator.fail_on(Operation::UpdateParameters).await;

    assert_eq!(h.engine.handle_task(&task).await, TaskOutcome::Acked);
}

#[tokio::test]
async fn test_job_progress_failure_still_acks() {
    let h = Harness::new();
    h.seed(&["m/a.txt"]).await;
    let task = h
        .ingestion(ingestion_params(&["m/a.txt"], "m2", NO_CHECKPOINT), 0)
        .await;
    h.coordinator.fail_on(Operation::ProgressJob).await;

    assert_eq!(h.engine.handle_task(&task).await, TaskOutcome::Acked);
    assert!(h.coordinator.job_progress(&task.job_id).await.is_none());
    assert!(
        !h.engine_calls()
            .await
            .iter()
            .any(|c| matches!(c, RecordedCall::Release { .. }))
    );
}

#[tokio::test]
async fn test_delete_ack_failure_releases_task() {
    let h = Harness::new();
    let task = h
        .take("Ingestion_Delete", "Delete", json!({"modelId": "m2"}), 0)
        .await;
    h.coordinator.fail_on(Operation::Ack).await;

    assert_eq!(h.engine.handle_delete_task(&task).await, TaskOutcome::Dropped);
    assert_eq!(
        h.engine_calls().await.last(),
        Some(&RecordedCall::Release {
            task_id: task.id.clone(),
        })
    );
}

#[tokio::test]
async fn test_empty_path_list_acks() {
    let h = Harness::new();
    let task = h
        .ingestion(ingestion_params(&[], "m2", NO_CHECKPOINT), 0)
        .await;

    assert_eq!(h.engine.handle_task(&task).await, TaskOutcome::Acked);
}

#[tokio::test]
async fn test_malformed_parameters_rejected_unrecoverable() {
    let h = Harness::new();
    let task = h.ingestion(json!({"modelId": "m2"}), 0).await;

    let outcome = h.engine.handle_task(&task).await;
    assert_eq!(outcome, TaskOutcome::Rejected { recoverable: false });

    let calls = h.engine_calls().await;
    assert!(matches!(
        &calls[0],
        RecordedCall::Reject { recoverable: false, reason, .. } if reason.contains("paths")
    ));
}

#[tokio::test]
async fn test_delete_removes_model_folder() {
    let source = Arc::new(ObjectStoreProvider::in_memory());
    let destination = Arc::new(ObjectStoreProvider::in_memory());
    for key in ["m2/a.txt", "m2/sub/b.txt", "other/c.txt"] {
        destination
            .post_file(key, Bytes::from_static(b"x"))
            .await
            .unwrap();
    }
    let h = Harness::with_stores(source, destination);

    let task = h
        .take("Ingestion_Delete", "Delete", json!({"modelId": "m2"}), 0)
        .await;

    assert_eq!(h.engine.handle_delete_task(&task).await, TaskOutcome::Acked);
    assert!(h.destination.get_file("m2/a.txt").await.is_err());
    assert!(h.destination.get_file("m2/sub/b.txt").await.is_err());
    assert!(h.destination.get_file("other/c.txt").await.is_ok());
    assert_eq!(h.metrics.snapshot().folders_deleted, 1);
}

#[tokio::test]
async fn test_delete_of_absent_folder_acks() {
    let h = Harness::new();
    let task = h
        .take(
            "Ingestion_Delete",
            "Delete",
            json!({"modelId": "ghost", "modelFolderId": "folder-1"}),
            0,
        )
        .await;

    assert_eq!(h.engine.handle_delete_task(&task).await, TaskOutcome::Acked);
    assert!(
        !h.engine_calls()
            .await
            .iter()
            .any(|c| matches!(c, RecordedCall::Reject { .. }))
    );
}

#[tokio::test]
async fn test_delete_at_max_attempts_rejects_without_deleting() {
    let source = Arc::new(ObjectStoreProvider::in_memory());
    let destination = Arc::new(ObjectStoreProvider::in_memory());
    destination
        .post_file("m2/a.txt", Bytes::from_static(b"x"))
        .await
        .unwrap();
    let h = Harness::with_stores(source, destination);

    let task = h
        .take("Ingestion_Delete", "Delete", json!({"modelId": "m2"}), MAX_ATTEMPTS)
        .await;

    assert_eq!(
        h.engine.handle_delete_task(&task).await,
        TaskOutcome::Rejected { recoverable: false }
    );
    assert!(h.destination.get_file("m2/a.txt").await.is_ok());
}

#[tokio::test]
async fn test_delete_with_empty_model_id_rejects_recoverable() {
    let h = Harness::new();
    let task = h
        .take("Ingestion_Delete", "Delete", json!({"modelId": ""}), 0)
        .await;

    assert_eq!(
        h.engine.handle_delete_task(&task).await,
        TaskOutcome::Rejected { recoverable: true }
    );
}
