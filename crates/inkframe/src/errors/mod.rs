//! Centralized error handling for inkframe
//!
//! All library layers report failures through the enums in [`types`], so the
//! worker pool can adjudicate a job's final status from a single error value.
//!
//! # Error Categories
//!
//! - **Repository Errors**: SeaORM queries against the job and content tables
//! - **Encode Errors**: image decoding, quantization and PNG assembly
//! - **Plugin Errors**: failures reported by a content plugin for one device
//! - **Render Errors**: anything that stops a job before its device loop starts
//! - **Scheduling Errors**: worker pool lifecycle and queue operations
//!
//! # Usage
//!
//! ```rust
//! use inkframe::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Convenience type alias for encoder Results
pub type EncodeResult<T> = Result<T, EncodeError>;
