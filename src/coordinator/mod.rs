//! Job manager (task coordinator) client
//!
//! The worker only ever talks to the coordinator through [`TaskCoordinator`]:
//!
//! - [`JobManagerClient`] - HTTP client for the job manager service, with a
//!   heartbeat kept alive for every task it hands out
//! - [`InMemoryCoordinator`] - process-local queue for development and tests

mod heartbeat;
mod http;
mod memory;
mod types;

pub use heartbeat::HeartbeatClient;
pub use http::JobManagerClient;
pub use memory::{InMemoryCoordinator, Operation, RecordedCall};
pub use types::{
    CompletedParameters, DeleteParameters, IngestionParameters, Job, NO_CHECKPOINT,
    OperationStatus, Task, UpdateJobBody, UpdateTaskBody,
};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Job manager request failed: {0}")]
    RequestFailed(String),

    #[error("Job manager returned HTTP {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Invalid job manager response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Job manager unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Remote task queue operations consumed by the worker
#[async_trait]
pub trait TaskCoordinator: Send + Sync {
    /// Claim the next pending task of the given type, if any
    async fn dequeue(&self, job_type: &str, task_type: &str) -> Result<Option<Task>>;

    /// Mark the task as completed
    async fn ack(&self, job_id: &str, task_id: &str) -> Result<()>;

    /// Mark the task as failed; recoverable tasks go back to pending
    async fn reject(
        &self,
        job_id: &str,
        task_id: &str,
        is_recoverable: bool,
        reason: &str,
    ) -> Result<()>;

    /// Replace the task's parameters with `parameters`
    async fn update_task_parameters(
        &self,
        job_id: &str,
        task_id: &str,
        parameters: Value,
    ) -> Result<()>;

    /// Recompute the job's completion percentage after one of its tasks completed
    async fn progress_job(&self, job_id: &str) -> Result<()>;

    /// Give up on a task without reporting an outcome, leaving it to lease expiry
    async fn release(&self, task_id: &str);
}
