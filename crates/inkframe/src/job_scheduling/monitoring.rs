//! Worker pool health classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::types::{MetricsSnapshot, QueueStats};
use crate::config::MonitoringConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// One entry per triggered condition
    pub recommendations: Vec<String>,
    pub metrics: MetricsSnapshot,
    pub queue: QueueStats,
    pub checked_at: DateTime<Utc>,
}

pub struct HealthMonitor {
    config: MonitoringConfig,
    expected_workers: usize,
    job_buffer: usize,
    last_status: Mutex<Option<HealthStatus>>,
}

impl HealthMonitor {
    pub fn new(config: MonitoringConfig, expected_workers: usize, job_buffer: usize) -> Self {
        Self {
            config,
            expected_workers,
            job_buffer,
            last_status: Mutex::new(None),
        }
    }

    pub fn evaluate(&self, metrics: MetricsSnapshot, queue: QueueStats) -> HealthReport {
        let now = Utc::now();
        let mut recommendations = Vec::new();
        let mut status = HealthStatus::Healthy;

        if metrics.active_workers < self.expected_workers {
            status = HealthStatus::Unhealthy;
            recommendations.push(format!(
                "Only {} of {} workers are running; restart the worker pool",
                metrics.active_workers, self.expected_workers
            ));
        }

        let occupancy = ratio(metrics.queue_length, self.job_buffer);
        if occupancy > self.config.channel_saturation {
            recommendations.push(format!(
                "Job channel is {:.0}% full; increase worker_pool.workers or worker_pool.job_buffer",
                occupancy * 100.0
            ));
        }

        let load = ratio(metrics.busy_workers, self.expected_workers);
        if load > self.config.worker_load {
            recommendations.push(format!(
                "Workers are {:.0}% busy; consider adding workers",
                load * 100.0
            ));
        }

        if queue.due_pending > self.config.backlog_threshold {
            let age = queue
                .oldest_pending_age(now)
                .map(|age| format!(", oldest due {}s ago", age.num_seconds()))
                .unwrap_or_default();
            recommendations.push(format!(
                "{} due jobs exceed the backlog threshold of {}{}",
                queue.due_pending, self.config.backlog_threshold, age
            ));
        }

        let success_rate = metrics.success_rate();
        if metrics.total_jobs >= self.config.min_sample
            && success_rate < self.config.min_success_rate
        {
            recommendations.push(format!(
                "Success rate is {:.0}% over {} jobs ({} failed rows queued); check plugin and catalog errors",
                success_rate * 100.0,
                metrics.total_jobs,
                queue.failed
            ));
        }

        if status == HealthStatus::Healthy && !recommendations.is_empty() {
            status = HealthStatus::Degraded;
        }

        HealthReport {
            status,
            recommendations,
            metrics,
            queue,
            checked_at: now,
        }
    }

    /// Log a report at a level matching its status
    pub fn log_report(&self, report: &HealthReport) {
        let previous = self
            .last_status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(report.status);

        match report.status {
            HealthStatus::Healthy if previous == Some(HealthStatus::Healthy) => {
                debug!(
                    "Worker pool healthy: {} pending, {}/{} workers busy",
                    report.queue.pending, report.metrics.busy_workers, self.expected_workers
                );
            }
            HealthStatus::Healthy => {
                info!(
                    "Worker pool healthy: {} pending, {}/{} workers busy",
                    report.queue.pending, report.metrics.busy_workers, self.expected_workers
                );
            }
            HealthStatus::Degraded => {
                warn!("Worker pool degraded");
                for recommendation in &report.recommendations {
                    warn!("  {}", recommendation);
                }
            }
            HealthStatus::Unhealthy => {
                error!("Worker pool unhealthy");
                for recommendation in &report.recommendations {
                    error!("  {}", recommendation);
                }
            }
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(MonitoringConfig::default(), 4, 100)
    }

    fn healthy_metrics() -> MetricsSnapshot {
        MetricsSnapshot {
            active_workers: 4,
            busy_workers: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy() {
        let report = monitor().evaluate(healthy_metrics(), QueueStats::default());
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_missing_workers_is_unhealthy() {
        let metrics = MetricsSnapshot {
            active_workers: 3,
            queue_length: 95,
            ..healthy_metrics()
        };
        let report = monitor().evaluate(metrics, QueueStats::default());
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.recommendations.len(), 2);
    }

    #[test]
    fn test_degraded_conditions() {
        let m = monitor();

        let saturated = MetricsSnapshot {
            queue_length: 91,
            ..healthy_metrics()
        };
        assert_eq!(m.evaluate(saturated, QueueStats::default()).status, HealthStatus::Degraded);

        let busy = MetricsSnapshot {
            busy_workers: 4,
            ..healthy_metrics()
        };
        assert_eq!(m.evaluate(busy, QueueStats::default()).status, HealthStatus::Degraded);

        let backlog = QueueStats {
            pending: 101,
            due_pending: 101,
            oldest_pending: Some(Utc::now() - chrono::Duration::minutes(10)),
            ..Default::default()
        };
        let report = m.evaluate(healthy_metrics(), backlog);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.recommendations[0].contains("oldest due"));

        let failing = MetricsSnapshot {
            total_jobs: 10,
            success_jobs: 5,
            failed_jobs: 5,
            ..healthy_metrics()
        };
        assert_eq!(m.evaluate(failing, QueueStats::default()).status, HealthStatus::Degraded);
    }

    #[test]
    fn test_future_schedules_are_not_backlog() {
        let scheduled_ahead = QueueStats {
            pending: 150,
            due_pending: 0,
            oldest_pending: Some(Utc::now() + chrono::Duration::minutes(10)),
            ..Default::default()
        };
        let report = monitor().evaluate(healthy_metrics(), scheduled_ahead);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_low_success_rate_needs_sample() {
        let few = MetricsSnapshot {
            total_jobs: 3,
            failed_jobs: 3,
            ..healthy_metrics()
        };
        assert_eq!(
            monitor().evaluate(few, QueueStats::default()).status,
            HealthStatus::Healthy
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_log_report_levels() {
        let m = monitor();
        let report = m.evaluate(
            MetricsSnapshot {
                active_workers: 0,
                ..Default::default()
            },
            QueueStats::default(),
        );
        m.log_report(&report);
        assert!(logs_contain("Worker pool unhealthy"));
        assert!(logs_contain("Only 0 of 4 workers"));
    }
}
