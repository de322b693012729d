//! Process-local task coordinator

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::types::{Job, OperationStatus, Task, UpdateJobBody};
use super::{CoordinatorError, Result, TaskCoordinator};

/// A coordinator call as observed by [`InMemoryCoordinator`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Dequeue {
        job_type: String,
        task_type: String,
    },
    Ack {
        job_id: String,
        task_id: String,
    },
    Reject {
        job_id: String,
        task_id: String,
        recoverable: bool,
        reason: String,
    },
    UpdateParameters {
        job_id: String,
        task_id: String,
        parameters: Value,
    },
    ProgressJob {
        job_id: String,
    },
    Release {
        task_id: String,
    },
}

/// Operation names accepted by [`InMemoryCoordinator::fail_on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Dequeue,
    Ack,
    Reject,
    UpdateParameters,
    ProgressJob,
}

#[derive(Default)]
struct State {
    pending: HashMap<(String, String), VecDeque<String>>,
    tasks: HashMap<String, Task>,
    queues: HashMap<String, (String, String)>,
    calls: Vec<RecordedCall>,
    failing: HashSet<Operation>,
    progress: HashMap<String, UpdateJobBody>,
}

impl State {
    fn check(&self, op: Operation) -> Result<()> {
        if self.failing.contains(&op) {
            Err(CoordinatorError::Unavailable(format!("{:?} disabled", op)))
        } else {
            Ok(())
        }
    }

    fn task_mut(&mut self, task_id: &str) -> Result<&mut Task> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| CoordinatorError::TaskNotFound(task_id.to_string()))
    }
}

/// In-memory job manager
///
/// Tasks are handed out FIFO per `(job_type, task_type)`. Every call is
/// recorded, and individual operations can be made to fail.
#[derive(Default)]
pub struct InMemoryCoordinator {
    state: Mutex<State>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a new pending task and return it
    pub async fn enqueue(
        &self,
        job_type: &str,
        task_type: &str,
        parameters: Value,
        attempts: u32,
    ) -> Task {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            job_id: Uuid::new_v4().to_string(),
            parameters,
            attempts,
            task_type: Some(task_type.to_string()),
            status: Some(OperationStatus::Pending),
            reason: None,
            description: None,
            resettable: Some(true),
            created: Some(now),
            updated: Some(now),
        };

        let key = (job_type.to_string(), task_type.to_string());
        let mut state = self.state.lock().await;
        state
            .pending
            .entry(key.clone())
            .or_default()
            .push_back(task.id.clone());
        state.queues.insert(task.id.clone(), key);
        state.tasks.insert(task.id.clone(), task.clone());

        task
    }

    /// Current state of a task
    pub async fn task(&self, task_id: &str) -> Option<Task> {
        self.state.lock().await.tasks.get(task_id).cloned()
    }

    /// Last progress reported for a job
    pub async fn job_progress(&self, job_id: &str) -> Option<UpdateJobBody> {
        self.state.lock().await.progress.get(job_id).cloned()
    }

    /// Every call received so far, in order
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of tasks still waiting in the given queue
    pub async fn pending(&self, job_type: &str, task_type: &str) -> usize {
        let key = (job_type.to_string(), task_type.to_string());
        self.state
            .lock()
            .await
            .pending
            .get(&key)
            .map_or(0, VecDeque::len)
    }

    /// Make `op` fail with [`CoordinatorError::Unavailable`] until cleared
    pub async fn fail_on(&self, op: Operation) {
        self.state.lock().await.failing.insert(op);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failing.clear();
    }
}

#[async_trait]
impl TaskCoordinator for InMemoryCoordinator {
    async fn dequeue(&self, job_type: &str, task_type: &str) -> Result<Option<Task>> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::Dequeue {
            job_type: job_type.to_string(),
            task_type: task_type.to_string(),
        });
        state.check(Operation::Dequeue)?;

        let key = (job_type.to_string(), task_type.to_string());
        let Some(task_id) = state.pending.get_mut(&key).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };

        let task = state.task_mut(&task_id)?;
        task.status = Some(OperationStatus::InProgress);
        task.updated = Some(Utc::now());
        Ok(Some(task.clone()))
    }

    async fn ack(&self, job_id: &str, task_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::Ack {
            job_id: job_id.to_string(),
            task_id: task_id.to_string(),
        });
        state.check(Operation::Ack)?;

        let task = state.task_mut(task_id)?;
        task.status = Some(OperationStatus::Completed);
        task.updated = Some(Utc::now());
        Ok(())
    }

    async fn reject(
        &self,
        job_id: &str,
        task_id: &str,
        is_recoverable: bool,
        reason: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::Reject {
            job_id: job_id.to_string(),
            task_id: task_id.to_string(),
            recoverable: is_recoverable,
            reason: reason.to_string(),
        });
        state.check(Operation::Reject)?;

        let task = state.task_mut(task_id)?;
        task.reason = Some(reason.to_string());
        task.updated = Some(Utc::now());

        if !is_recoverable {
            task.status = Some(OperationStatus::Failed);
            return Ok(());
        }

        task.status = Some(OperationStatus::Pending);
        task.attempts += 1;

        if let Some(key) = state.queues.get(task_id).cloned() {
            state
                .pending
                .entry(key)
                .or_default()
                .push_back(task_id.to_string());
        }
        Ok(())
    }

    async fn update_task_parameters(
        &self,
        job_id: &str,
        task_id: &str,
        parameters: Value,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::UpdateParameters {
            job_id: job_id.to_string(),
            task_id: task_id.to_string(),
            parameters: parameters.clone(),
        });
        state.check(Operation::UpdateParameters)?;

        let task = state.task_mut(task_id)?;
        task.parameters = parameters;
        task.updated = Some(Utc::now());
        Ok(())
    }

    async fn progress_job(&self, job_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::ProgressJob {
            job_id: job_id.to_string(),
        });
        state.check(Operation::ProgressJob)?;

        let tasks: Vec<&Task> = state.tasks.values().filter(|t| t.job_id == job_id).collect();
        if tasks.is_empty() {
            return Err(CoordinatorError::JobNotFound(job_id.to_string()));
        }

        let job = Job {
            id: job_id.to_string(),
            task_count: tasks.len() as u32,
            completed_tasks: tasks
                .iter()
                .filter(|t| t.status == Some(OperationStatus::Completed))
                .count() as u32,
            status: None,
            percentage: None,
        };

        if let Some(body) = job.progress() {
            state.progress.insert(job_id.to_string(), body);
        }
        Ok(())
    }

    async fn release(&self, task_id: &str) {
        self.state.lock().await.calls.push(RecordedCall::Release {
            task_id: task_id.to_string(),
        });
    }
}
