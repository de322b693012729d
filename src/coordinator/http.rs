//! HTTP client for the job manager service

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::heartbeat::HeartbeatClient;
use super::types::{Job, OperationStatus, Task, UpdateTaskBody};
use super::{CoordinatorError, Result, TaskCoordinator};
use crate::config::JobManagerConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BASE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Delay before retry number `attempt` (1-based): 100ms, 200ms, 400ms, ... capped at 10s
fn backoff(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    BASE_BACKOFF.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Job manager client
pub struct JobManagerClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    heartbeat: HeartbeatClient,
}

impl JobManagerClient {
    /// Create a new job manager client
    pub fn new(config: &JobManagerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("filesyncer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoordinatorError::RequestFailed(e.to_string()))?;

        let heartbeat = HeartbeatClient::new(
            client.clone(),
            &config.heartbeat_url,
            config.heartbeat_interval(),
        );

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            max_retries: config.request_retries,
            heartbeat,
        })
    }

    /// Heartbeats for the tasks currently held by this client
    pub fn heartbeat(&self) -> &HeartbeatClient {
        &self.heartbeat
    }

    fn task_url(&self, job_id: &str, task_id: &str) -> String {
        format!("{}/jobs/{}/tasks/{}", self.base_url, job_id, task_id)
    }

    /// Send a request with retry on transport errors and 5xx responses
    async fn send<F>(&self, method: Method, url: &str, build: F) -> Result<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let request = build(self.client.request(method.clone(), url));
            let error = match request.send().await {
                Ok(response) if !response.status().is_server_error() => {
                    if attempts > 1 {
                        debug!(url, attempts, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Ok(response) => CoordinatorError::UnexpectedStatus {
                    status: response.status().as_u16(),
                    url: url.to_string(),
                },
                Err(e) => CoordinatorError::RequestFailed(e.to_string()),
            };

            if attempts > self.max_retries {
                warn!(url, attempts, error = %error, "Job manager request failed after retries");
                return Err(error);
            }

            warn!(url, attempts, error = %error, "Job manager request failed, retrying");

            tokio::time::sleep(backoff(attempts)).await;
        }
    }

    async fn update_task(&self, job_id: &str, task_id: &str, body: &UpdateTaskBody) -> Result<()> {
        let url = self.task_url(job_id, task_id);
        let response = self.send(Method::PUT, &url, |r| r.json(body)).await?;
        ensure_success(response, &url)?;
        Ok(())
    }

    async fn get_task(&self, job_id: &str, task_id: &str) -> Result<Task> {
        let url = self.task_url(job_id, task_id);
        let response = self.send(Method::GET, &url, |r| r).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CoordinatorError::TaskNotFound(task_id.to_string()));
        }

        let response = ensure_success(response, &url)?;
        read_json(response).await
    }

    async fn get_job(&self, job_id: &str) -> Result<Job> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);
        let response = self.send(Method::GET, &url, |r| r).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CoordinatorError::JobNotFound(job_id.to_string()));
        }

        let response = ensure_success(response, &url)?;
        read_json(response).await
    }
}

fn ensure_success(response: Response, url: &str) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(CoordinatorError::UnexpectedStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| CoordinatorError::RequestFailed(format!("Failed to read body: {}", e)))?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl TaskCoordinator for JobManagerClient {
    async fn dequeue(&self, job_type: &str, task_type: &str) -> Result<Option<Task>> {
        let url = format!(
            "{}/tasks/{}/{}/startPending",
            self.base_url, job_type, task_type
        );

        let response = self.send(Method::POST, &url, |r| r).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(job_type, task_type, "No pending task");
            return Ok(None);
        }

        let response = ensure_success(response, &url)?;
        let task: Task = read_json(response).await?;

        info!(job_id = %task.job_id, task_id = %task.id, attempts = task.attempts, "Dequeued task");
        self.heartbeat.start(&task.id);

        Ok(Some(task))
    }

    async fn ack(&self, job_id: &str, task_id: &str) -> Result<()> {
        self.heartbeat.stop(task_id).await;

        let body = UpdateTaskBody {
            status: Some(OperationStatus::Completed),
            percentage: Some(100),
            ..Default::default()
        };
        self.update_task(job_id, task_id, &body).await
    }

    async fn reject(
        &self,
        job_id: &str,
        task_id: &str,
        is_recoverable: bool,
        reason: &str,
    ) -> Result<()> {
        self.heartbeat.stop(task_id).await;

        let body = if is_recoverable {
            let task = self.get_task(job_id, task_id).await?;
            UpdateTaskBody {
                status: Some(OperationStatus::Pending),
                attempts: Some(task.attempts + 1),
                reason: Some(reason.to_string()),
                ..Default::default()
            }
        } else {
            UpdateTaskBody {
                status: Some(OperationStatus::Failed),
                reason: Some(reason.to_string()),
                ..Default::default()
            }
        };

        self.update_task(job_id, task_id, &body).await
    }

    async fn update_task_parameters(
        &self,
        job_id: &str,
        task_id: &str,
        parameters: Value,
    ) -> Result<()> {
        let body = UpdateTaskBody {
            parameters: Some(parameters),
            ..Default::default()
        };
        self.update_task(job_id, task_id, &body).await
    }

    async fn progress_job(&self, job_id: &str) -> Result<()> {
        let job = self.get_job(job_id).await?;
        let Some(body) = job.progress() else {
            warn!(job_id, "Job has no tasks, skipping progress update");
            return Ok(());
        };

        debug!(job_id, percentage = ?body.percentage, completed = body.status.is_some(), "Updating job progress");

        let url = format!("{}/jobs/{}", self.base_url, job_id);
        let response = self.send(Method::PUT, &url, |r| r.json(&body)).await?;
        ensure_success(response, &url)?;
        Ok(())
    }

    async fn release(&self, task_id: &str) {
        self.heartbeat.stop(task_id).await;
    }
}
