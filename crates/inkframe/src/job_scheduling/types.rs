//! Job scheduling type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use uuid::Uuid;

use crate::database::repositories::QueueCounts;
use crate::models::JobStatus;

/// Outcome of one job, emitted by a worker exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub target_id: Uuid,
    /// Owner of the target, when it could be resolved
    pub user_id: Option<Uuid>,
    pub success: bool,
    pub status: JobStatus,
    pub error: Option<String>,
    pub message: String,
    pub duration_ms: u64,
}

/// Lock-free counters shared by workers, feeder and result processor
#[derive(Debug, Default)]
pub struct PoolMetrics {
    total_jobs: AtomicU64,
    success_jobs: AtomicU64,
    failed_jobs: AtomicU64,
    queue_length: AtomicUsize,
    active_workers: AtomicUsize,
    busy_workers: AtomicUsize,
    peak_busy_workers: AtomicUsize,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_result(&self, success: bool) {
        self.total_jobs.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_jobs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_jobs.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_queue_length(&self, length: usize) {
        self.queue_length.store(length, Ordering::Relaxed);
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn worker_stopped(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn job_started(&self) {
        let busy = self.busy_workers.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_busy_workers.fetch_max(busy, Ordering::SeqCst);
    }

    pub fn job_finished(&self) {
        self.busy_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_jobs: self.total_jobs.load(Ordering::Relaxed),
            success_jobs: self.success_jobs.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            queue_length: self.queue_length.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::SeqCst),
            busy_workers: self.busy_workers.load(Ordering::SeqCst),
            peak_busy_workers: self.peak_busy_workers.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time copy of [`PoolMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_jobs: u64,
    pub success_jobs: u64,
    pub failed_jobs: u64,
    /// Jobs buffered in the work channel
    pub queue_length: usize,
    pub active_workers: usize,
    pub busy_workers: usize,
    /// Highest number of workers ever busy at once
    pub peak_busy_workers: usize,
}

impl MetricsSnapshot {
    /// Share of finished jobs that succeeded, 1.0 when nothing ran yet
    pub fn success_rate(&self) -> f64 {
        if self.total_jobs == 0 {
            1.0
        } else {
            self.success_jobs as f64 / self.total_jobs as f64
        }
    }
}

/// Queue statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    /// Pending rows already due; future schedules are not backlog
    pub due_pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub oldest_pending: Option<DateTime<Utc>>,
}

impl QueueStats {
    /// How long the oldest pending row has been due
    pub fn oldest_pending_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.oldest_pending
            .map(|scheduled| now - scheduled)
            .filter(|age| *age > chrono::Duration::zero())
    }
}

impl From<QueueCounts> for QueueStats {
    fn from(counts: QueueCounts) -> Self {
        Self {
            pending: counts.pending,
            due_pending: counts.due_pending,
            processing: counts.processing,
            completed: counts.completed,
            failed: counts.failed,
            cancelled: counts.cancelled,
            oldest_pending: counts.oldest_pending,
        }
    }
}

/// What one cleanup sweep changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub retried: usize,
    pub deleted: u64,
}
