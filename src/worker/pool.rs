//! Bounded task pool
//!
//! At most `task_pool_size` tasks are in flight across both queues. A slot is
//! claimed before the coordinator is asked for work, so a saturated pool never
//! dequeues; the slot is released when the task's guard drops.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::engine::{TaskEngine, TaskOutcome};
use crate::config::{JobManagerConfig, TaskTypeConfig};
use crate::coordinator::{Task, TaskCoordinator};
use crate::observability::Metrics;

/// Which queue a task comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Ingestion,
    Delete,
}

/// Holds a pool slot and the in-flight gauge for one task
struct InFlight {
    _permit: OwnedSemaphorePermit,
    metrics: Arc<Metrics>,
}

impl InFlight {
    fn new(permit: OwnedSemaphorePermit, metrics: Arc<Metrics>) -> Self {
        metrics.task_started();
        Self {
            _permit: permit,
            metrics,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.metrics.task_finished();
    }
}

pub struct TaskPool {
    permits: Arc<Semaphore>,
    size: usize,
    engine: Arc<TaskEngine>,
    coordinator: Arc<dyn TaskCoordinator>,
    metrics: Arc<Metrics>,
    ingestion: TaskTypeConfig,
    delete: TaskTypeConfig,
    poll_interval: Duration,
}

impl TaskPool {
    pub fn new(
        size: usize,
        engine: Arc<TaskEngine>,
        coordinator: Arc<dyn TaskCoordinator>,
        metrics: Arc<Metrics>,
        job_manager: &JobManagerConfig,
        poll_interval: Duration,
    ) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            engine,
            coordinator,
            metrics,
            ingestion: job_manager.ingestion.clone(),
            delete: job_manager.delete.clone(),
            poll_interval,
        }
    }

    /// Tasks currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    pub fn has_capacity(&self) -> bool {
        self.permits.available_permits() > 0
    }

    /// Dequeue and run one ingestion task; false when saturated or idle
    pub async fn handle_ingestion_task(&self) -> bool {
        self.handle(TaskKind::Ingestion).await
    }

    /// Dequeue and run one delete task; false when saturated or idle
    pub async fn handle_delete_task(&self) -> bool {
        self.handle(TaskKind::Delete).await
    }

    async fn handle(&self, kind: TaskKind) -> bool {
        match self.claim(kind).await {
            Some((slot, task)) => {
                self.execute(kind, slot, task).await;
                true
            }
            None => false,
        }
    }

    fn types(&self, kind: TaskKind) -> &TaskTypeConfig {
        match kind {
            TaskKind::Ingestion => &self.ingestion,
            TaskKind::Delete => &self.delete,
        }
    }

    /// Reserve a slot, then ask the coordinator for a task
    async fn claim(&self, kind: TaskKind) -> Option<(InFlight, Task)> {
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            debug!(?kind, size = self.size, "Task pool saturated");
            return None;
        };

        let types = self.types(kind);
        match self
            .coordinator
            .dequeue(&types.job_type, &types.task_type)
            .await
        {
            Ok(Some(task)) => Some((InFlight::new(permit, self.metrics.clone()), task)),
            Ok(None) => None,
            Err(e) => {
                warn!(?kind, error = %e, "Failed to dequeue task");
                None
            }
        }
    }

    async fn execute(&self, kind: TaskKind, slot: InFlight, task: Task) -> TaskOutcome {
        let outcome = match kind {
            TaskKind::Ingestion => self.engine.handle_task(&task).await,
            TaskKind::Delete => self.engine.handle_delete_task(&task).await,
        };
        debug!(task_id = %task.id, ?outcome, "Task finished");
        drop(slot);
        outcome
    }

    /// Poll `kind` every interval until `shutdown` flips, then drain
    pub async fn run(self: Arc<Self>, kind: TaskKind, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut running = JoinSet::new();

        info!(?kind, size = self.size, "Polling started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    while let Some((slot, task)) = self.claim(kind).await {
                        let pool = Arc::clone(&self);
                        running.spawn(async move { pool.execute(kind, slot, task).await });
                    }
                }
            }

            while let Some(joined) = running.try_join_next() {
                if let Err(e) = joined {
                    error!(?kind, error = %e, "Task panicked");
                }
            }
        }

        info!(?kind, in_flight = running.len(), "Polling stopped, draining tasks");
        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                error!(?kind, error = %e, "Task panicked");
            }
        }
        info!(?kind, "Drained");
    }
}
