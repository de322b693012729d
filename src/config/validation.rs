use super::models::{Config, ProviderConfig};
use thiserror::Error;

/// Upper bound for `job_manager.request_retries`
pub const MAX_REQUEST_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("worker.task_pool_size must be positive")]
    InvalidTaskPoolSize,

    #[error("worker.max_attempts must be positive")]
    InvalidMaxAttempts,

    #[error("{field} must be positive")]
    InvalidInterval { field: String },

    #[error("Invalid URL for {field}: '{value}', expected 'http://' or 'https://'")]
    InvalidUrl { field: String, value: String },

    #[error("job_manager.request_retries must be at most {max}, got {value}")]
    TooManyRequestRetries { value: u32, max: u32 },

    #[error("{field} must not be empty")]
    EmptyField { field: String },

    #[error("Storage provider '{side}' is S3 but missing credentials (access_key_id or secret_access_key)")]
    MissingS3Credentials { side: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_worker(config)?;
    validate_job_manager(config)?;
    validate_provider("source", &config.storage.source)?;
    validate_provider("destination", &config.storage.destination)?;
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    if config.worker.task_pool_size == 0 {
        return Err(ValidationError::InvalidTaskPoolSize);
    }

    if config.worker.max_attempts == 0 {
        return Err(ValidationError::InvalidMaxAttempts);
    }

    if config.worker.poll_interval_ms == 0 {
        return Err(ValidationError::InvalidInterval {
            field: "worker.poll_interval_ms".to_string(),
        });
    }

    Ok(())
}

fn validate_job_manager(config: &Config) -> Result<(), ValidationError> {
    let job_manager = &config.job_manager;

    validate_url("job_manager.url", &job_manager.url)?;
    validate_url("job_manager.heartbeat_url", &job_manager.heartbeat_url)?;

    if job_manager.heartbeat_interval_ms == 0 {
        return Err(ValidationError::InvalidInterval {
            field: "job_manager.heartbeat_interval_ms".to_string(),
        });
    }

    if job_manager.request_retries > MAX_REQUEST_RETRIES {
        return Err(ValidationError::TooManyRequestRetries {
            value: job_manager.request_retries,
            max: MAX_REQUEST_RETRIES,
        });
    }

    for (section, types) in [
        ("job_manager.ingestion", &job_manager.ingestion),
        ("job_manager.delete", &job_manager.delete),
    ] {
        if types.job_type.is_empty() {
            return Err(ValidationError::EmptyField {
                field: format!("{}.job_type", section),
            });
        }
        if types.task_type.is_empty() {
            return Err(ValidationError::EmptyField {
                field: format!("{}.task_type", section),
            });
        }
    }

    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        return Ok(());
    }

    Err(ValidationError::InvalidUrl {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Validate one side of the provider pair
fn validate_provider(side: &str, provider: &ProviderConfig) -> Result<(), ValidationError> {
    match provider {
        ProviderConfig::Nfs(nfs) => {
            if nfs.pv_path.as_os_str().is_empty() {
                return Err(ValidationError::EmptyField {
                    field: format!("storage.{}.pv_path", side),
                });
            }
        }
        ProviderConfig::S3(s3) => {
            if s3.bucket.is_empty() {
                return Err(ValidationError::EmptyField {
                    field: format!("storage.{}.bucket", side),
                });
            }
            if let Some(endpoint) = &s3.endpoint {
                validate_url(&format!("storage.{}.endpoint", side), endpoint)?;
            }
            if s3.access_key_id.is_none() || s3.secret_access_key.is_none() {
                return Err(ValidationError::MissingS3Credentials {
                    side: side.to_string(),
                });
            }
        }
    }

    Ok(())
}
