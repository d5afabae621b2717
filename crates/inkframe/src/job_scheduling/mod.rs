//! Job scheduling subsystem for inkframe
//!
//! Render jobs live in the database and move through
//! `pending → processing → {completed | failed | cancelled}`. The subsystem
//! is built around four components:
//! - `QueueManager`: inserts jobs, computes next occurrences, retries and prunes
//! - `ClockPolicy`: timezone-aware next-occurrence computation
//! - `WorkerPool`: feeder, fixed workers and result aggregation
//! - `HealthMonitor`: classifies pool and queue health

pub mod monitoring;
pub mod queue_manager;
pub mod schedule_policy;
pub mod types;
pub mod worker_pool;

pub use monitoring::{HealthMonitor, HealthReport, HealthStatus};
pub use queue_manager::QueueManager;
pub use schedule_policy::{ClockPolicy, RefreshInterval, TimezoneClockPolicy, resolve_timezone};
pub use types::*;
pub use worker_pool::{JobSubmitter, WorkerPool};
