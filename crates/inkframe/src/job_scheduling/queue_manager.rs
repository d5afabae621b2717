//! Persisted render queue
//!
//! The queue manager owns every insert into `render_jobs` and the policy
//! sweeps over it (retry, age-based deletion). Status transitions during
//! execution belong to the worker pool and the orchestrator.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::schedule_policy::{ClockPolicy, RefreshInterval, TimezoneClockPolicy, resolve_timezone};
use super::types::{CleanupReport, QueueStats};
use super::worker_pool::JobSubmitter;
use crate::catalog::{Target, TargetCatalog, TargetKind};
use crate::config::QueueConfig;
use crate::database::repositories::{RenderJobCreateRequest, RenderJobSeaOrmRepository};
use crate::errors::JobSchedulingError;
use crate::models::RenderJob;

pub type SchedulingResult<T> = Result<T, JobSchedulingError>;

pub struct QueueManager {
    repository: RenderJobSeaOrmRepository,
    catalog: Arc<dyn TargetCatalog>,
    clock: Arc<dyn ClockPolicy>,
    config: QueueConfig,
    submitter: RwLock<Option<JobSubmitter>>,
}

impl QueueManager {
    pub fn new(
        repository: RenderJobSeaOrmRepository,
        catalog: Arc<dyn TargetCatalog>,
        config: QueueConfig,
    ) -> Self {
        Self {
            repository,
            catalog,
            clock: Arc::new(TimezoneClockPolicy),
            config,
            submitter: RwLock::new(None),
        }
    }

    pub fn with_clock_policy(mut self, clock: Arc<dyn ClockPolicy>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable direct submission for `schedule_immediate(.., true)`
    pub fn attach_submitter(&self, submitter: JobSubmitter) {
        *self.submitter.write().unwrap_or_else(|e| e.into_inner()) = Some(submitter);
    }

    pub fn repository(&self) -> &RenderJobSeaOrmRepository {
        &self.repository
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Insert a pending job
    ///
    /// No uniqueness check; callers look for an active job first when they
    /// need one.
    pub async fn schedule_render(
        &self,
        target_id: Uuid,
        priority: i32,
        when: DateTime<Utc>,
        independent: bool,
    ) -> SchedulingResult<RenderJob> {
        let job = self
            .repository
            .create(RenderJobCreateRequest {
                target_id,
                priority,
                scheduled_for: when,
                independent,
            })
            .await?;

        debug!(
            "Scheduled render {} for target {} at {} (priority {})",
            job.id,
            target_id,
            when.format("%Y-%m-%d %H:%M:%S UTC"),
            priority
        );
        Ok(job)
    }

    /// Schedule a high-priority render for now
    ///
    /// With `bypass` the persisted row is also pushed straight into the worker
    /// channel. A full channel is not an error; the feeder picks the row up
    /// on a later tick.
    pub async fn schedule_immediate(
        &self,
        target_id: Uuid,
        bypass: bool,
    ) -> SchedulingResult<RenderJob> {
        if self.find_target(target_id).await?.is_none() {
            return Err(JobSchedulingError::TargetNotFound(target_id));
        }

        let job = self
            .schedule_render(target_id, self.config.immediate_priority, Utc::now(), false)
            .await?;

        if bypass {
            let submitter = self
                .submitter
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            match submitter {
                Some(submitter) if submitter.try_submit(job.clone()) => {
                    debug!("Job {} submitted directly to the worker pool", job.id);
                }
                _ => {
                    debug!(
                        "Direct submission unavailable for job {}, left for the feeder",
                        job.id
                    );
                }
            }
        }

        info!("Immediate render {} queued for target {}", job.id, target_id);
        Ok(job)
    }

    /// Change a target's interval and restart its schedule from now
    pub async fn update_refresh_interval(
        &self,
        target_id: Uuid,
        minutes: i32,
    ) -> SchedulingResult<RenderJob> {
        if minutes <= 0 {
            return Err(JobSchedulingError::InvalidJob {
                reason: format!("refresh interval must be positive, got {minutes}"),
            });
        }

        let updated = self
            .catalog
            .update_refresh_interval(target_id, minutes)
            .await
            .map_err(JobSchedulingError::catalog)?;
        if !updated {
            return Err(JobSchedulingError::TargetNotFound(target_id));
        }

        self.repository
            .cancel_pending_for_target(target_id, None)
            .await?;
        let when = Utc::now() + Duration::minutes(i64::from(minutes));
        let job = self
            .schedule_render(target_id, self.config.scheduled_priority, when, false)
            .await?;

        info!(
            "Refresh interval of target {} set to {} minute(s), next render at {}",
            target_id,
            minutes,
            when.format("%Y-%m-%d %H:%M:%S UTC")
        );
        Ok(job)
    }

    /// Interval used for scheduling; mashups take the minimum of their children
    pub async fn effective_interval_minutes(&self, target: &Target) -> SchedulingResult<i32> {
        let TargetKind::Mashup { children } = &target.kind else {
            return Ok(target.refresh_interval_minutes);
        };

        let mut minimum: Option<i32> = None;
        for child_id in children {
            if let Some(child) = self.find_target(*child_id).await? {
                minimum = Some(minimum.map_or(child.refresh_interval_minutes, |m| {
                    m.min(child.refresh_interval_minutes)
                }));
            }
        }
        Ok(minimum.unwrap_or(target.refresh_interval_minutes))
    }

    /// Next occurrence for a target in its owner's timezone
    pub async fn next_run_at(
        &self,
        target: &Target,
        now: DateTime<Utc>,
    ) -> SchedulingResult<DateTime<Utc>> {
        let minutes = self.effective_interval_minutes(target).await?;
        let owner = self
            .catalog
            .find_user(target.user_id)
            .await
            .map_err(JobSchedulingError::catalog)?;
        let timezone = resolve_timezone(owner.as_ref().and_then(|u| u.timezone.as_deref()));

        Ok(self
            .clock
            .next_occurrence(RefreshInterval::from_minutes(minutes), timezone, now))
    }

    /// Schedule the next occurrence unless the target already has an active job
    pub async fn schedule_next(&self, target_id: Uuid) -> SchedulingResult<Option<RenderJob>> {
        if self.repository.has_active_for_target(target_id).await? {
            debug!(
                "Target {} already has an active job, not scheduling another",
                target_id
            );
            return Ok(None);
        }

        let Some(target) = self.find_target(target_id).await? else {
            return Ok(None);
        };
        if !target.is_active {
            return Ok(None);
        }

        let when = self.next_run_at(&target, Utc::now()).await?;
        let job = self
            .schedule_render(target_id, self.config.scheduled_priority, when, false)
            .await?;
        Ok(Some(job))
    }

    /// Give every active target without an active job its next occurrence
    pub async fn ensure_scheduled(&self) -> SchedulingResult<usize> {
        let targets = self
            .catalog
            .list_active_targets()
            .await
            .map_err(JobSchedulingError::catalog)?;

        let mut scheduled = 0;
        for target in targets {
            match self.schedule_next(target.id).await {
                Ok(Some(_)) => scheduled += 1,
                Ok(None) => {}
                Err(e) => warn!("Failed to schedule target '{}' ({}): {}", target.name, target.id, e),
            }
        }

        if scheduled > 0 {
            info!("Seeded schedules for {} target(s)", scheduled);
        }
        Ok(scheduled)
    }

    /// Retry failed jobs under the attempt cap, then delete old terminal rows
    pub async fn cleanup_jobs(&self) -> SchedulingResult<CleanupReport> {
        let now = Utc::now();
        let backoff = to_chrono(self.config.retry_backoff);
        let mut report = CleanupReport::default();

        for job in self.repository.find_retryable(self.config.max_attempts).await? {
            if self.repository.has_active_for_target(job.target_id).await? {
                continue;
            }
            if self.repository.reset_for_retry(job.id, now + backoff).await? {
                debug!(
                    "Retrying job {} for target {} (attempt {} of {})",
                    job.id,
                    job.target_id,
                    job.attempts + 1,
                    self.config.max_attempts
                );
                report.retried += 1;
            }
        }

        let cutoff = now - to_chrono(self.config.job_retention);
        report.deleted = self.repository.delete_terminal_older_than(cutoff).await?;

        if report.retried > 0 || report.deleted > 0 {
            info!(
                "Job cleanup: {} retried, {} deleted",
                report.retried, report.deleted
            );
        }
        Ok(report)
    }

    /// Cancel one pending job; the row stays for the audit trail
    pub async fn cancel_job(&self, job_id: Uuid) -> SchedulingResult<bool> {
        let cancelled = self.repository.cancel_pending(job_id).await?;
        if cancelled {
            info!("Cancelled job {}", job_id);
        }
        Ok(cancelled)
    }

    pub async fn cancel_pending_for_target(
        &self,
        target_id: Uuid,
        except: Option<Uuid>,
    ) -> SchedulingResult<u64> {
        Ok(self
            .repository
            .cancel_pending_for_target(target_id, except)
            .await?)
    }

    pub async fn stats(&self) -> SchedulingResult<QueueStats> {
        Ok(self.repository.counts().await?.into())
    }

    async fn find_target(&self, target_id: Uuid) -> SchedulingResult<Option<Target>> {
        self.catalog
            .find_target(target_id)
            .await
            .map_err(JobSchedulingError::catalog)
    }
}

fn to_chrono(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, UserProfile};
    use crate::database::Database;
    use crate::models::JobStatus;
    use chrono::Timelike;
    use chrono_tz::Tz;

    struct Fixture {
        queue: QueueManager,
        catalog: Arc<InMemoryCatalog>,
        user_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let db = Database::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let catalog = Arc::new(InMemoryCatalog::new());
        let user_id = Uuid::new_v4();
        catalog
            .upsert_user(UserProfile {
                id: user_id,
                timezone: Some("Asia/Tokyo".to_string()),
            })
            .await;

        let queue = QueueManager::new(
            RenderJobSeaOrmRepository::new(db.connection()),
            catalog.clone(),
            QueueConfig::default(),
        );
        Fixture {
            queue,
            catalog,
            user_id,
        }
    }

    fn target(user_id: Uuid, minutes: i32) -> Target {
        Target {
            id: Uuid::new_v4(),
            user_id,
            name: "target".to_string(),
            plugin_type: "static_image".to_string(),
            is_active: true,
            refresh_interval_minutes: minutes,
            kind: TargetKind::Single,
            settings: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_schedule_next_continuous() {
        let f = fixture().await;
        let t = target(f.user_id, 15);
        f.catalog.upsert_target(t.clone()).await;

        let before = Utc::now();
        let job = f.queue.schedule_next(t.id).await.unwrap().unwrap();
        let after = Utc::now();

        assert!(job.scheduled_for >= before + Duration::minutes(15));
        assert!(job.scheduled_for <= after + Duration::minutes(15));
        assert!(!job.independent);

        // an active job already exists
        assert!(f.queue.schedule_next(t.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_schedule_next_daily_in_owner_timezone() {
        let f = fixture().await;
        let t = target(f.user_id, 1440);
        f.catalog.upsert_target(t.clone()).await;

        let job = f.queue.schedule_next(t.id).await.unwrap().unwrap();
        let local = job.scheduled_for.with_timezone(&Tz::Asia__Tokyo);
        assert_eq!((local.hour(), local.minute()), (0, 15));
    }

    #[tokio::test]
    async fn test_mashup_uses_minimum_child_interval() {
        let f = fixture().await;
        let fast = target(f.user_id, 30);
        let slow = target(f.user_id, 120);
        let mut mashup = target(f.user_id, 1440);
        mashup.kind = TargetKind::Mashup {
            children: vec![fast.id, slow.id, Uuid::new_v4()],
        };
        for t in [&fast, &slow, &mashup] {
            f.catalog.upsert_target(t.clone()).await;
        }

        assert_eq!(f.queue.effective_interval_minutes(&mashup).await.unwrap(), 30);

        // derived on every decision
        f.catalog.update_refresh_interval(fast.id, 240).await.unwrap();
        assert_eq!(f.queue.effective_interval_minutes(&mashup).await.unwrap(), 120);
    }

    #[tokio::test]
    async fn test_schedule_immediate_without_pool() {
        let f = fixture().await;
        let t = target(f.user_id, 15);
        f.catalog.upsert_target(t.clone()).await;

        let job = f.queue.schedule_immediate(t.id, true).await.unwrap();
        assert_eq!(job.priority, QueueConfig::default().immediate_priority);
        assert!(job.scheduled_for <= Utc::now());

        assert!(matches!(
            f.queue.schedule_immediate(Uuid::new_v4(), false).await,
            Err(JobSchedulingError::TargetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_refresh_interval_replaces_pending() {
        let f = fixture().await;
        let t = target(f.user_id, 15);
        f.catalog.upsert_target(t.clone()).await;
        f.queue.schedule_next(t.id).await.unwrap();
        f.queue
            .schedule_render(t.id, 10, Utc::now(), false)
            .await
            .unwrap();

        let job = f.queue.update_refresh_interval(t.id, 60).await.unwrap();
        let jobs = f.queue.repository().list_for_target(t.id).await.unwrap();
        let pending: Vec<_> = jobs.iter().filter(|j| j.status == JobStatus::Pending).collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, job.id);
        assert!(job.scheduled_for > Utc::now() + Duration::minutes(59));

        let stored = f.catalog.find_target(t.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_interval_minutes, 60);

        assert!(f.queue.update_refresh_interval(t.id, 0).await.is_err());
        assert!(matches!(
            f.queue.update_refresh_interval(Uuid::new_v4(), 30).await,
            Err(JobSchedulingError::TargetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_retries_failed_jobs() {
        let f = fixture().await;
        let repo = f.queue.repository();
        let job = f
            .queue
            .schedule_render(Uuid::new_v4(), 10, Utc::now(), false)
            .await
            .unwrap();
        repo.mark_processing(job.id).await.unwrap();
        repo.mark_failed(job.id, "upstream down".to_string()).await.unwrap();

        let report = f.queue.cleanup_jobs().await.unwrap();
        assert_eq!(report.retried, 1);
        let retried = repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert!(retried.error_message.is_none());
        assert!(retried.scheduled_for > Utc::now() + Duration::minutes(4));
    }

    #[tokio::test]
    async fn test_cleanup_leaves_exhausted_jobs_failed() {
        let f = fixture().await;
        let repo = f.queue.repository();
        let job = f
            .queue
            .schedule_render(Uuid::new_v4(), 10, Utc::now(), false)
            .await
            .unwrap();
        for _ in 0..QueueConfig::default().max_attempts {
            repo.reset_for_retry(job.id, Utc::now()).await.unwrap();
            repo.mark_processing(job.id).await.unwrap();
            repo.mark_failed(job.id, "boom".to_string()).await.unwrap();
        }

        let report = f.queue.cleanup_jobs().await.unwrap();
        assert_eq!(report.retried, 0);
        let failed = repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_ensure_scheduled_and_cancel() {
        let f = fixture().await;
        let active = target(f.user_id, 15);
        let mut inactive = target(f.user_id, 15);
        inactive.is_active = false;
        f.catalog.upsert_target(active.clone()).await;
        f.catalog.upsert_target(inactive).await;

        assert_eq!(f.queue.ensure_scheduled().await.unwrap(), 1);
        assert_eq!(f.queue.ensure_scheduled().await.unwrap(), 0);

        let stats = f.queue.stats().await.unwrap();
        assert_eq!(stats.pending, 1);

        let job = &f.queue.repository().list_for_target(active.id).await.unwrap()[0];
        assert!(f.queue.cancel_job(job.id).await.unwrap());
        assert!(!f.queue.cancel_job(job.id).await.unwrap());
        assert_eq!(f.queue.stats().await.unwrap().cancelled, 1);
    }
}
