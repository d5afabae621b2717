//! Error type definitions for inkframe
//!
//! This module defines the error hierarchy used throughout the crate. Each
//! layer owns one enum; higher layers wrap lower ones with `#[from]`.

use thiserror::Error;
use uuid::Uuid;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors (SeaORM)
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Render orchestration errors
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Job scheduling errors
    #[error("Scheduling error: {0}")]
    Scheduling(#[from] JobSchedulingError),

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database errors from SeaORM
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A stored value could not be mapped back to its domain type
    #[error("Invalid stored value: {field} = '{value}'")]
    InvalidValue { field: String, value: String },

    /// Record not found
    #[error("Record not found: {table} with {field} = {value}")]
    RecordNotFound {
        table: String,
        field: String,
        value: String,
    },
}

/// Image encoder errors
#[derive(Error, Debug)]
pub enum EncodeError {
    /// Raw bytes could not be decoded into an image
    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// Device reported a bit depth the encoder cannot emit
    #[error("Unsupported bit depth: {0} (expected 1, 2, 4 or 8)")]
    UnsupportedBitDepth(u8),

    /// Zero-sized or oversized dimensions
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Pixel buffer length does not match the declared dimensions
    #[error("Pixel buffer holds {actual} samples, expected {expected}")]
    BufferMismatch { expected: usize, actual: usize },

    /// zlib stream could not be written
    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Errors raised by content plugins
#[derive(Error, Debug)]
pub enum PluginError {
    /// The plugin is registered but could not build a renderer for this target
    #[error("Plugin '{plugin_type}' cannot render target {target_id}: {message}")]
    Unsupported {
        plugin_type: String,
        target_id: Uuid,
        message: String,
    },

    /// Target settings are missing a required key or hold an invalid value
    #[error("Invalid settings for plugin '{plugin_type}': {message}")]
    InvalidSettings {
        plugin_type: String,
        message: String,
    },

    /// The upstream content source failed
    #[error("Plugin '{plugin_type}' failed: {message}")]
    Upstream {
        plugin_type: String,
        message: String,
    },

    /// Local I/O failed while producing content
    #[error("Plugin I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that stop a render job or a single device render
#[derive(Error, Debug)]
pub enum RenderError {
    /// The target's owner could not be loaded
    #[error("Owner {user_id} of target {target_id} not found")]
    OwnerNotFound { target_id: Uuid, user_id: Uuid },

    /// The target catalog failed to answer
    #[error("Catalog lookup failed: {message}")]
    Catalog { message: String },

    /// Repository failure while reading or updating rows
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Content plugin failure
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Encoder failure
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Artifact file could not be written or removed
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// A blocking encoder task was cancelled or panicked
    #[error("Encoder task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<sea_orm::DbErr> for RenderError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Errors that can occur in the job scheduling system
#[derive(Error, Debug)]
pub enum JobSchedulingError {
    /// Start was called on a pool that is already running
    #[error("Worker pool is already running")]
    AlreadyRunning,

    /// Start was called after the job channel had been closed
    #[error("Worker pool has been stopped and cannot be restarted")]
    PoolClosed,

    /// Stop was called on a pool that never started
    #[error("Worker pool is not running")]
    NotRunning,

    /// Target referenced by a scheduling request does not exist
    #[error("Target {0} not found")]
    TargetNotFound(Uuid),

    /// Invalid job configuration
    #[error("Invalid job configuration: {reason}")]
    InvalidJob { reason: String },

    /// Repository failure
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Catalog failure
    #[error("Catalog error: {message}")]
    Catalog { message: String },
}

impl From<sea_orm::DbErr> for JobSchedulingError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl RenderError {
    /// Create a catalog error from any displayable failure
    pub fn catalog<E: std::fmt::Display>(err: E) -> Self {
        Self::Catalog {
            message: err.to_string(),
        }
    }
}

impl JobSchedulingError {
    /// Create a catalog error from any displayable failure
    pub fn catalog<E: std::fmt::Display>(err: E) -> Self {
        Self::Catalog {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_wraps_db_error() {
        let err: RenderError = sea_orm::DbErr::Custom("boom".to_string()).into();
        assert!(matches!(err, RenderError::Repository(RepositoryError::Database(_))));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_app_error_helpers() {
        let err = AppError::not_found("target", "abc");
        assert_eq!(err.to_string(), "Not found: target with id abc");

        let err = AppError::configuration("bad port");
        assert_eq!(err.to_string(), "Configuration error: bad port");
    }

    #[test]
    fn test_encode_error_messages() {
        let err = EncodeError::UnsupportedBitDepth(3);
        assert_eq!(err.to_string(), "Unsupported bit depth: 3 (expected 1, 2, 4 or 8)");
    }
}
