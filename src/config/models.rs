use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub job_manager: JobManagerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Liveness server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Job manager (task coordinator) connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobManagerConfig {
    #[serde(default = "default_job_manager_url")]
    pub url: String,
    #[serde(default = "default_heartbeat_url")]
    pub heartbeat_url: String,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Retries for a single coordinator request (transport errors and 5xx)
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,
    #[serde(default = "default_ingestion_types")]
    pub ingestion: TaskTypeConfig,
    #[serde(default = "default_delete_types")]
    pub delete: TaskTypeConfig,
}

impl JobManagerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            url: default_job_manager_url(),
            heartbeat_url: default_heartbeat_url(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            request_retries: default_request_retries(),
            ingestion: default_ingestion_types(),
            delete: default_delete_types(),
        }
    }
}

/// Job/task type pair used when dequeuing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskTypeConfig {
    pub job_type: String,
    pub task_type: String,
}

fn default_job_manager_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_heartbeat_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    3000
}

fn default_request_retries() -> u32 {
    3
}

fn default_ingestion_types() -> TaskTypeConfig {
    TaskTypeConfig {
        job_type: "Ingestion_New".to_string(),
        task_type: "Ingestion".to_string(),
    }
}

fn default_delete_types() -> TaskTypeConfig {
    TaskTypeConfig {
        job_type: "Ingestion_Delete".to_string(),
        task_type: "Delete".to_string(),
    }
}

/// Task pool and retry policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Maximum number of tasks in flight at once
    #[serde(default = "default_task_pool_size")]
    pub task_pool_size: usize,
    /// Rejections at or above this attempt count are not recoverable
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            task_pool_size: default_task_pool_size(),
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_task_pool_size() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Source and destination providers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_source")]
    pub source: ProviderConfig,
    #[serde(default = "default_destination")]
    pub destination: ProviderConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            destination: default_destination(),
        }
    }
}

fn default_source() -> ProviderConfig {
    ProviderConfig::Nfs(NfsConfig {
        pv_path: PathBuf::from("data/source"),
    })
}

fn default_destination() -> ProviderConfig {
    ProviderConfig::Nfs(NfsConfig {
        pv_path: PathBuf::from("data/destination"),
    })
}

/// Storage backend, tagged by `kind`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    S3(S3Config),
    Nfs(NfsConfig),
}

impl ProviderConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::S3(_) => "s3",
            ProviderConfig::Nfs(_) => "nfs",
        }
    }
}

/// Mounted volume settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NfsConfig {
    pub pv_path: PathBuf,
}

/// S3-compatible object store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Usually supplied through the environment, never written back out
    #[serde(default, skip_serializing)]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub secret_access_key: Option<String>,
    #[serde(default = "default_force_path_style")]
    pub force_path_style: bool,
    /// Client-side retries per request
    #[serde(default = "default_s3_max_attempts")]
    pub max_attempts: usize,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_force_path_style() -> bool {
    true
}

fn default_s3_max_attempts() -> usize {
    3
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
