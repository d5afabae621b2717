use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory rendered PNG artifacts are written to
    #[serde(default = "default_rendered_content_path")]
    pub rendered_content_path: PathBuf,
    /// Artifacts not confirmed by a render within this window are removed
    #[serde(default = "default_content_max_age", with = "duration")]
    pub content_max_age: Duration,
}

/// Worker pool sizing and timer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Capacity of the shared job channel
    #[serde(default = "default_job_buffer")]
    pub job_buffer: usize,
    /// Capacity of the result channel
    #[serde(default = "default_result_buffer")]
    pub result_buffer: usize,
    #[serde(default = "default_feed_interval", with = "duration")]
    pub feed_interval: Duration,
    /// Maximum rows pulled from the store per feeder tick
    #[serde(default = "default_feed_batch_size")]
    pub feed_batch_size: usize,
    /// Feeder skips a tick once the job channel is this full (0.0 - 1.0)
    #[serde(default = "default_feed_threshold")]
    pub feed_threshold: f64,
    #[serde(default = "default_shutdown_grace", with = "duration")]
    pub shutdown_grace: Duration,
    #[serde(default = "default_cleanup_interval", with = "duration")]
    pub cleanup_interval: Duration,
    #[serde(default = "default_monitor_interval", with = "duration")]
    pub monitor_interval: Duration,
}

/// Queue retry and retention policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_retry_backoff", with = "duration")]
    pub retry_backoff: Duration,
    /// Terminal jobs older than this are deleted by the cleanup sweep
    #[serde(default = "default_job_retention", with = "duration")]
    pub job_retention: Duration,
    #[serde(default = "default_immediate_priority")]
    pub immediate_priority: i32,
    #[serde(default = "default_scheduled_priority")]
    pub scheduled_priority: i32,
}

/// Health classification thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Pending jobs above this count mark the system degraded
    #[serde(default = "default_backlog_threshold")]
    pub backlog_threshold: u64,
    /// Job channel occupancy ratio above which the system is degraded
    #[serde(default = "default_channel_saturation")]
    pub channel_saturation: f64,
    /// Busy-worker ratio above which the system is degraded
    #[serde(default = "default_worker_load")]
    pub worker_load: f64,
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// Completed jobs required before the success rate is judged
    #[serde(default = "default_min_sample")]
    pub min_sample: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// TOML file describing users, targets and devices
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_rendered_content_path() -> PathBuf {
    PathBuf::from(DEFAULT_RENDERED_CONTENT_PATH)
}

fn default_content_max_age() -> Duration {
    Duration::from_secs(DEFAULT_CONTENT_MAX_AGE_SECS)
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_job_buffer() -> usize {
    DEFAULT_JOB_BUFFER
}

fn default_result_buffer() -> usize {
    DEFAULT_RESULT_BUFFER
}

fn default_feed_interval() -> Duration {
    Duration::from_secs(DEFAULT_FEED_INTERVAL_SECS)
}

fn default_feed_batch_size() -> usize {
    DEFAULT_FEED_BATCH_SIZE
}

fn default_feed_threshold() -> f64 {
    DEFAULT_FEED_THRESHOLD
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS)
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECS)
}

fn default_max_attempts() -> i32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS)
}

fn default_job_retention() -> Duration {
    Duration::from_secs(DEFAULT_JOB_RETENTION_SECS)
}

fn default_immediate_priority() -> i32 {
    DEFAULT_IMMEDIATE_PRIORITY
}

fn default_scheduled_priority() -> i32 {
    DEFAULT_SCHEDULED_PRIORITY
}

fn default_backlog_threshold() -> u64 {
    DEFAULT_BACKLOG_THRESHOLD
}

fn default_channel_saturation() -> f64 {
    DEFAULT_CHANNEL_SATURATION
}

fn default_worker_load() -> f64 {
    DEFAULT_WORKER_LOAD
}

fn default_min_success_rate() -> f64 {
    DEFAULT_MIN_SUCCESS_RATE
}

fn default_min_sample() -> u64 {
    DEFAULT_MIN_SAMPLE
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(DEFAULT_CATALOG_PATH)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: Some(DEFAULT_MAX_CONNECTIONS),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            rendered_content_path: default_rendered_content_path(),
            content_max_age: default_content_max_age(),
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            job_buffer: default_job_buffer(),
            result_buffer: default_result_buffer(),
            feed_interval: default_feed_interval(),
            feed_batch_size: default_feed_batch_size(),
            feed_threshold: default_feed_threshold(),
            shutdown_grace: default_shutdown_grace(),
            cleanup_interval: default_cleanup_interval(),
            monitor_interval: default_monitor_interval(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff: default_retry_backoff(),
            job_retention: default_job_retention(),
            immediate_priority: default_immediate_priority(),
            scheduled_priority: default_scheduled_priority(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            backlog_threshold: default_backlog_threshold(),
            channel_saturation: default_channel_saturation(),
            worker_load: default_worker_load(),
            min_success_rate: default_min_success_rate(),
            min_sample: default_min_sample(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

impl WorkerPoolConfig {
    /// Reject configurations the pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            anyhow::bail!("worker_pool.workers must be at least 1");
        }
        if self.job_buffer == 0 || self.result_buffer == 0 {
            anyhow::bail!("worker_pool buffers must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.feed_threshold) {
            anyhow::bail!(
                "worker_pool.feed_threshold must be between 0.0 and 1.0, got {}",
                self.feed_threshold
            );
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let config: Self = if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)
                .with_context(|| format!("Failed to read config file {config_file}"))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {config_file}"))?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)
                .with_context(|| format!("Failed to write default config {config_file}"))?;
            info!("Created default config file: {}", config_file);
            default_config
        };

        config.worker_pool.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.worker_pool.workers, DEFAULT_WORKERS);
        assert_eq!(config.queue.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.queue.retry_backoff, Duration::from_secs(300));
        assert_eq!(config.database.url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_partial_sections_override() {
        let config: Config = toml::from_str(
            r#"
            [worker_pool]
            workers = 8
            feed_interval = "2s"

            [queue]
            retry_backoff = "10m"
            "#,
        )
        .unwrap();

        assert_eq!(config.worker_pool.workers, 8);
        assert_eq!(config.worker_pool.feed_interval, Duration::from_secs(2));
        assert_eq!(config.worker_pool.job_buffer, DEFAULT_JOB_BUFFER);
        assert_eq!(config.queue.retry_backoff, Duration::from_secs(600));
    }

    #[test]
    fn test_worker_pool_validation() {
        let mut pool = WorkerPoolConfig::default();
        assert!(pool.validate().is_ok());

        pool.workers = 0;
        assert!(pool.validate().is_err());

        pool.workers = 2;
        pool.feed_threshold = 1.5;
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path_str = path.to_str().unwrap();

        let config = Config::load_from_file(path_str).unwrap();
        assert!(path.exists());
        assert_eq!(config.worker_pool.workers, DEFAULT_WORKERS);

        let reloaded = Config::load_from_file(path_str).unwrap();
        assert_eq!(reloaded.storage.content_max_age, config.storage.content_max_age);
    }
}
