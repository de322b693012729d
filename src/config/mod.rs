//! Configuration management for the file syncer
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use filesyncer::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Task pool size: {}", config.worker.task_pool_size);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `FILESYNCER__<section>__<key>`
//!
//! Examples:
//! - `FILESYNCER__WORKER__TASK_POOL_SIZE=20`
//! - `FILESYNCER__JOB_MANAGER__URL=http://job-manager:8080`
//! - `FILESYNCER__STORAGE__DESTINATION__SECRET_ACCESS_KEY=...`
//!
//! S3 credentials left unset fall back to `AWS_ACCESS_KEY_ID` and
//! `AWS_SECRET_ACCESS_KEY`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/filesyncer.toml`.
//! This can be overridden using the `FILESYNCER_CONFIG` environment variable
//! or the `--config` flag.

mod models;
mod sources;
mod validation;

pub use models::{
    Config, JobManagerConfig, NfsConfig, ProviderConfig, S3Config, ServerConfig, StorageConfig,
    TaskTypeConfig, TelemetryConfig, WorkerConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`FILESYNCER__*`)
    /// 2. TOML file (default: `config/filesyncer.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(sources::default_path())
    }

    /// Load configuration from a specific path, then apply environment overrides
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Effective configuration as TOML, credentials omitted
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[worker]
task_pool_size = 2
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.worker.task_pool_size, 2);
        assert_eq!(config.worker.max_attempts, 3);
    }

    #[test]
    fn test_validation_catches_zero_pool() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[worker]
task_pool_size = 0
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidTaskPoolSize)
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"

[job_manager]
url = "http://job-manager:8080"
heartbeat_url = "http://heartbeat-manager:8080"
heartbeat_interval_ms = 3000

[job_manager.ingestion]
job_type = "Ingestion_New"
task_type = "Ingestion"

[job_manager.delete]
job_type = "Ingestion_Delete"
task_type = "Delete"

[worker]
task_pool_size = 5
max_attempts = 3
poll_interval_ms = 500

[storage.source]
kind = "nfs"
pv_path = "/mnt/ingestion"

[storage.destination]
kind = "s3"
endpoint = "http://minio:9000"
bucket = "3d-tiles"
access_key_id = "minio"
secret_access_key = "minio123"

[telemetry]
log_level = "debug"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.worker.task_pool_size, 5);
        assert_eq!(config.storage.source.kind(), "nfs");
        assert_eq!(config.storage.destination.kind(), "s3");
        assert_eq!(config.telemetry.log_level, "debug");

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("3d-tiles"));
        assert!(!rendered.contains("minio123"));
    }
}
