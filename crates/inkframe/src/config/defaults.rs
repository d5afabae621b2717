/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/inkframe.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

// Storage defaults
pub const DEFAULT_RENDERED_CONTENT_PATH: &str = "./data/rendered";
pub const DEFAULT_CONTENT_MAX_AGE_SECS: u64 = 30 * 24 * 3600;

// Worker pool defaults
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_JOB_BUFFER: usize = 100;
pub const DEFAULT_RESULT_BUFFER: usize = 100;
pub const DEFAULT_FEED_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_FEED_BATCH_SIZE: usize = 20;
pub const DEFAULT_FEED_THRESHOLD: f64 = 0.8;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 10 * 60;
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 60;

// Queue defaults
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 5 * 60;
pub const DEFAULT_JOB_RETENTION_SECS: u64 = 7 * 24 * 3600;
pub const DEFAULT_IMMEDIATE_PRIORITY: i32 = 100;
pub const DEFAULT_SCHEDULED_PRIORITY: i32 = 10;

// Monitoring defaults
pub const DEFAULT_BACKLOG_THRESHOLD: u64 = 100;
pub const DEFAULT_CHANNEL_SATURATION: f64 = 0.9;
pub const DEFAULT_WORKER_LOAD: f64 = 0.95;
pub const DEFAULT_MIN_SUCCESS_RATE: f64 = 0.8;
pub const DEFAULT_MIN_SAMPLE: u64 = 10;

// Catalog defaults
pub const DEFAULT_CATALOG_PATH: &str = "./catalog.toml";
