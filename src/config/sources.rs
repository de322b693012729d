use super::models::{Config, ProviderConfig};
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "FILESYNCER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/filesyncer.toml";
const ENV_PREFIX: &str = "FILESYNCER";
const ENV_SEPARATOR: &str = "__";

/// Resolve the configuration file path (`FILESYNCER_CONFIG` or the default)
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(config_path: PathBuf) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path)?;

    load_secrets(&mut config);

    Ok(config)
}

/// Fill missing S3 credentials from the AWS-style environment variables.
/// Explicit `FILESYNCER__STORAGE__<SIDE>__ACCESS_KEY_ID` values win.
fn load_secrets(config: &mut Config) {
    let access_key = env::var("AWS_ACCESS_KEY_ID").ok();
    let secret_key = env::var("AWS_SECRET_ACCESS_KEY").ok();

    for side in [&mut config.storage.source, &mut config.storage.destination] {
        if let ProviderConfig::S3(s3) = side {
            if s3.access_key_id.is_none() {
                s3.access_key_id = access_key.clone();
            }
            if s3.secret_access_key.is_none() {
                s3.secret_access_key = secret_key.clone();
            }
        }
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // FILESYNCER__WORKER__TASK_POOL_SIZE -> worker.task_pool_size
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
