use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resume cursor meaning "no file has failed yet"
pub const NO_CHECKPOINT: i64 = -1;

/// Task lifecycle status as tracked by the job manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    #[serde(rename = "In-Progress")]
    InProgress,
    Completed,
    Failed,
    Expired,
    Aborted,
}

/// A unit of work dequeued from the job manager.
///
/// `parameters` stays untyped on the wire; the worker decodes it into
/// [`IngestionParameters`] or [`DeleteParameters`] depending on which queue
/// the task came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub job_id: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub attempts: u32,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OperationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resettable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl Task {
    /// Decode the task's parameters into a concrete shape
    pub fn parameters_as<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.parameters.clone())
    }
}

/// Parameters of a file-copy task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionParameters {
    /// Keys to copy, in transfer order
    pub paths: Vec<String>,
    /// Replaces the first segment of each key at the destination
    pub model_id: String,
    #[serde(default = "no_checkpoint")]
    pub last_index_error: i64,
}

impl IngestionParameters {
    /// Index of the first file to transfer in this attempt
    pub fn start_index(&self) -> usize {
        usize::try_from(self.last_index_error).unwrap_or(0)
    }

    /// Checkpoint to persist when the file at `index` failed
    pub fn checkpoint_at(&self, index: usize) -> Self {
        Self {
            paths: self.paths.clone(),
            model_id: self.model_id.clone(),
            last_index_error: index as i64,
        }
    }
}

fn no_checkpoint() -> i64 {
    NO_CHECKPOINT
}

/// Parameters left on a completed task once the path list is dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedParameters {
    pub model_id: String,
    pub last_index_error: i64,
}

/// Parameters of a model deletion task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteParameters {
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_folder_id: Option<String>,
}

/// Job counters as reported by the job manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub task_count: u32,
    #[serde(default)]
    pub completed_tasks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OperationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
}

impl Job {
    /// Progress update for the job's current counters; `None` for a job without tasks
    pub fn progress(&self) -> Option<UpdateJobBody> {
        if self.task_count == 0 {
            return None;
        }

        let completed = self.completed_tasks.min(self.task_count);
        let percentage = (u64::from(completed) * 100 / u64::from(self.task_count)) as u8;
        let status = (completed == self.task_count).then_some(OperationStatus::Completed);

        Some(UpdateJobBody {
            percentage: Some(percentage),
            status,
        })
    }
}

/// Body of a job update request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OperationStatus>,
}

/// Body of a task update request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OperationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
