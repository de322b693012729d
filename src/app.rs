//! Process composition: providers, coordinator, pool and liveness server

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Config;
use crate::coordinator::{CoordinatorError, JobManagerClient, TaskCoordinator};
use crate::observability::Metrics;
use crate::server;
use crate::storage::{ProviderPair, StorageError};
use crate::worker::{TaskEngine, TaskKind, TaskPool};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Coordinator setup failed: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Liveness server failed: {0}")]
    Server(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// A fully wired worker process
pub struct App {
    config: Config,
    metrics: Arc<Metrics>,
    pool: Arc<TaskPool>,
}

impl App {
    /// Resolve providers and the job manager client from configuration
    pub fn build(config: Config) -> Result<Self> {
        let providers = ProviderPair::from_config(&config.storage)?;
        let coordinator: Arc<dyn TaskCoordinator> =
            Arc::new(JobManagerClient::new(&config.job_manager)?);
        Ok(Self::with_parts(config, providers, coordinator))
    }

    /// Wire the worker around already-built providers and coordinator
    pub fn with_parts(
        config: Config,
        providers: ProviderPair,
        coordinator: Arc<dyn TaskCoordinator>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let engine = Arc::new(TaskEngine::new(
            providers,
            coordinator.clone(),
            metrics.clone(),
            config.worker.max_attempts,
        ));
        let pool = Arc::new(TaskPool::new(
            config.worker.task_pool_size,
            engine,
            coordinator,
            metrics.clone(),
            &config.job_manager,
            config.worker.poll_interval(),
        ));

        Self {
            config,
            metrics,
            pool,
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn pool(&self) -> Arc<TaskPool> {
        self.pool.clone()
    }

    /// Run until SIGINT/SIGTERM, then drain in-flight tasks
    pub async fn run(self) -> Result<()> {
        self.run_until(server::shutdown_signal()).await
    }

    /// Run until `signal` resolves, then drain in-flight tasks
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (stop_polling, polling) = watch::channel(false);
        let (stop_server, mut server_stop) = watch::channel(false);

        let mut server = tokio::spawn(server::run(
            self.config.server.bind_addr,
            self.metrics.clone(),
            async move {
                let _ = server_stop.changed().await;
            },
        ));

        let ingestion = tokio::spawn(self.pool.clone().run(TaskKind::Ingestion, polling.clone()));
        let delete = tokio::spawn(self.pool.clone().run(TaskKind::Delete, polling));

        info!(
            pool_size = self.config.worker.task_pool_size,
            max_attempts = self.config.worker.max_attempts,
            "Worker started"
        );

        let server_failed = tokio::select! {
            _ = signal => None,
            joined = &mut server => Some(joined),
        };

        let _ = stop_polling.send(true);
        ingestion.await?;
        delete.await?;
        info!("In-flight tasks drained");

        if let Some(joined) = server_failed {
            let message = match joined? {
                Ok(()) => "stopped unexpectedly".to_string(),
                Err(e) => e.to_string(),
            };
            error!(error = %message, "Liveness server exited");
            return Err(AppError::Server(message));
        }

        let _ = stop_server.send(true);
        server.await?.map_err(|e| AppError::Server(e.to_string()))?;

        info!("Worker stopped");
        Ok(())
    }
}
