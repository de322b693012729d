//! Task execution engine
//!
//! Drives a single dequeued task to its terminal outcome. Ingestion tasks copy
//! `paths[lastIndexError..]` from the source to the destination provider in
//! order and stop at the first failure; the failing index is written back as
//! the resume checkpoint before the task is rejected. Delete tasks remove the
//! model folder from the destination.

use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::coordinator::{
    CompletedParameters, DeleteParameters, IngestionParameters, NO_CHECKPOINT, Task,
    TaskCoordinator,
};
use crate::observability::Metrics;
use crate::storage::{ProviderPair, StorageError};

const DELETE_FAILED: &str = "failed to delete model folder";

/// Progress of one ingestion attempt
#[derive(Debug)]
pub struct TaskResult {
    /// Index of the next file to transfer (or of the file that failed)
    pub index: usize,
    /// True once every path was transferred
    pub completed: bool,
    pub error: Option<StorageError>,
}

/// How the engine left a task with the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Acked,
    Rejected { recoverable: bool },
    /// The coordinator could not be told; its lease will redeliver the task
    Dropped,
}

/// Executes ingestion and delete tasks against a provider pair
pub struct TaskEngine {
    providers: ProviderPair,
    coordinator: Arc<dyn TaskCoordinator>,
    metrics: Arc<Metrics>,
    max_attempts: u32,
}

impl TaskEngine {
    pub fn new(
        providers: ProviderPair,
        coordinator: Arc<dyn TaskCoordinator>,
        metrics: Arc<Metrics>,
        max_attempts: u32,
    ) -> Self {
        Self {
            providers,
            coordinator,
            metrics,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run an ingestion task to completion
    pub async fn handle_task(&self, task: &Task) -> TaskOutcome {
        let span = info_span!("ingestion", job_id = %task.job_id, task_id = %task.id, attempts = task.attempts);

        async {
            let params: IngestionParameters = match task.parameters_as() {
                Ok(params) => params,
                Err(e) => {
                    warn!(error = %e, "Malformed ingestion parameters");
                    let reason = format!("invalid task parameters: {}", e);
                    return self.reject(task, false, &reason).await;
                }
            };

            info!(
                files = params.paths.len(),
                model_id = %params.model_id,
                resume_from = params.start_index(),
                "Starting ingestion"
            );

            let result = self.transfer(&params).await;
            if result.completed {
                self.handle_completed_task(task, &params).await
            } else {
                self.handle_failed_task(task, &params, result).await
            }
        }
        .instrument(span)
        .await
    }

    /// Copy files from the checkpoint onwards, stopping at the first failure
    async fn transfer(&self, params: &IngestionParameters) -> TaskResult {
        let mut index = params.start_index();

        while index < params.paths.len() {
            let path = &params.paths[index];
            if let Err(e) = self.sync_file(path, &params.model_id).await {
                warn!(index, path = %path, error = %e, "File transfer failed");
                return TaskResult {
                    index,
                    completed: false,
                    error: Some(e),
                };
            }
            index += 1;
        }

        TaskResult {
            index,
            completed: true,
            error: None,
        }
    }

    /// Copy one file, renaming its top-level folder to `model_id`
    pub async fn sync_file(&self, path: &str, model_id: &str) -> Result<(), StorageError> {
        let source = &self.providers.source;
        let data = source
            .get_file(path)
            .instrument(info_span!("get_file", provider = source.kind(), path))
            .await?;

        let target = change_model_name(path, model_id);
        let size = data.len();

        let destination = &self.providers.destination;
        destination
            .post_file(&target, data)
            .instrument(info_span!("post_file", provider = destination.kind(), path = %target))
            .await?;

        self.metrics.file_transferred(size);
        debug!(path, target = %target, size, "File transferred");
        Ok(())
    }

    async fn handle_completed_task(&self, task: &Task, params: &IngestionParameters) -> TaskOutcome {
        if let Err(e) = self
            .coordinator
            .ack(&task.job_id, &task.id)
            .instrument(info_span!("ack"))
            .await
        {
            error!(error = %e, "Failed to ack task");
            return self.drop_task(task).await;
        }
        self.metrics.task_acked();
        info!(files = params.paths.len(), "Task completed");

        // Drop the path list now that the task is done
        let cleanup = CompletedParameters {
            model_id: params.model_id.clone(),
            last_index_error: NO_CHECKPOINT,
        };
        if let Err(e) = self.update_parameters(task, &cleanup).await {
            warn!(error = %e, "Failed to clear task parameters after ack");
        }

        if let Err(e) = self
            .coordinator
            .progress_job(&task.job_id)
            .instrument(info_span!("progress_job"))
            .await
        {
            warn!(error = %e, "Failed to update job progress");
        }

        TaskOutcome::Acked
    }

    /// Persist the checkpoint at the failed file, then reject the task
    pub async fn handle_failed_task(
        &self,
        task: &Task,
        params: &IngestionParameters,
        result: TaskResult,
    ) -> TaskOutcome {
        let checkpoint = params.checkpoint_at(result.index);
        if let Err(e) = self.update_parameters(task, &checkpoint).await {
            error!(index = result.index, error = %e, "Failed to persist checkpoint");
            return self.drop_task(task).await;
        }

        let recoverable = task.attempts < self.max_attempts;
        let reason = result
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("transfer stopped at file {}", result.index));

        info!(index = result.index, recoverable, "Rejecting task");
        self.reject(task, recoverable, &reason).await
    }

    /// Delete the model folder from the destination
    pub async fn handle_delete_task(&self, task: &Task) -> TaskOutcome {
        let span = info_span!("delete", job_id = %task.job_id, task_id = %task.id, attempts = task.attempts);

        async {
            if task.attempts >= self.max_attempts {
                warn!(max_attempts = self.max_attempts, "Delete task exhausted its attempts");
                let reason = format!("reached max attempts ({})", self.max_attempts);
                return self.reject(task, false, &reason).await;
            }

            let params: DeleteParameters = match task.parameters_as() {
                Ok(params) => params,
                Err(e) => {
                    warn!(error = %e, "Malformed delete parameters");
                    let reason = format!("invalid task parameters: {}", e);
                    return self.reject(task, false, &reason).await;
                }
            };

            let destination = &self.providers.destination;
            let deleted = destination
                .delete_folder(&params.model_id)
                .instrument(info_span!(
                    "delete_folder",
                    provider = destination.kind(),
                    model_id = %params.model_id,
                    model_folder_id = ?params.model_folder_id
                ))
                .await;

            match deleted {
                Ok(()) => {
                    self.metrics.folder_deleted();
                    info!(model_id = %params.model_id, "Model folder deleted");
                    self.ack(task).await
                }
                Err(e) => {
                    warn!(model_id = %params.model_id, error = %e, "Failed to delete model folder");
                    let mut reason = e.to_string();
                    if reason.is_empty() {
                        reason = DELETE_FAILED.to_string();
                    }
                    self.reject(task, true, &reason).await
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn ack(&self, task: &Task) -> TaskOutcome {
        match self
            .coordinator
            .ack(&task.job_id, &task.id)
            .instrument(info_span!("ack"))
            .await
        {
            Ok(()) => {
                self.metrics.task_acked();
                TaskOutcome::Acked
            }
            Err(e) => {
                error!(error = %e, "Failed to ack task");
                self.drop_task(task).await
            }
        }
    }

    async fn reject(&self, task: &Task, recoverable: bool, reason: &str) -> TaskOutcome {
        match self
            .coordinator
            .reject(&task.job_id, &task.id, recoverable, reason)
            .instrument(info_span!("reject", recoverable))
            .await
        {
            Ok(()) => {
                self.metrics.task_rejected();
                TaskOutcome::Rejected { recoverable }
            }
            Err(e) => {
                error!(error = %e, "Failed to reject task");
                self.drop_task(task).await
            }
        }
    }

    /// Stop holding a task the coordinator could not be told about
    async fn drop_task(&self, task: &Task) -> TaskOutcome {
        self.coordinator.release(&task.id).await;
        self.metrics.task_dropped();
        warn!("Task dropped, left to lease expiry");
        TaskOutcome::Dropped
    }

    async fn update_parameters<P: serde::Serialize>(
        &self,
        task: &Task,
        parameters: &P,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let value = serde_json::to_value(parameters)?;
        self.coordinator
            .update_task_parameters(&task.job_id, &task.id, value)
            .instrument(info_span!("update_task_parameters"))
            .await?;
        Ok(())
    }
}

/// Replace the first `/`-delimited segment of `path` with `model_id`
pub fn change_model_name(path: &str, model_id: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').collect();
    segments[0] = model_id;
    segments.join("/")
}
