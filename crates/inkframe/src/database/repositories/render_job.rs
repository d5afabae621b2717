//! SeaORM-based repository for persisted render jobs
//!
//! Status transitions are conditional `UPDATE`s, so a row only moves out of
//! `pending` once even when the feeder and a direct submission race.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::traits::{ConversionUtils, EntityToDomain};
use crate::entities::{prelude::RenderJobs, render_jobs};
use crate::errors::RepositoryResult;
use crate::models::{JobStatus, RenderJob};

/// Request for job creation
#[derive(Debug, Clone)]
pub struct RenderJobCreateRequest {
    pub target_id: Uuid,
    pub priority: i32,
    pub scheduled_for: DateTime<Utc>,
    pub independent: bool,
}

/// Smallest page `find_ready` reads; targets with several due rows take
/// more than one slot of a page
const READY_PAGE_MIN: u64 = 16;

/// Row counts per status plus the oldest pending schedule
///
/// `due_pending` counts only pending rows whose `scheduled_for` has passed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub due_pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub oldest_pending: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct RenderJobSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

impl RenderJobSeaOrmRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Insert a pending job
    pub async fn create(&self, request: RenderJobCreateRequest) -> RepositoryResult<RenderJob> {
        let now = Utc::now();
        let active_model = render_jobs::ActiveModel {
            id: Set(Uuid::new_v4()),
            target_id: Set(request.target_id),
            priority: Set(request.priority),
            scheduled_for: Set(request.scheduled_for),
            status: Set(JobStatus::Pending.to_string()),
            attempts: Set(0),
            last_attempt: Set(None),
            error_message: Set(None),
            independent: Set(request.independent),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active_model.insert(&*self.connection).await?;
        self.to_domain(model)
    }

    pub async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<RenderJob>> {
        RenderJobs::find_by_id(id)
            .one(&*self.connection)
            .await?
            .map(|m| self.to_domain(m))
            .transpose()
    }

    /// Jobs for a target, newest schedule first
    pub async fn list_for_target(&self, target_id: Uuid) -> RepositoryResult<Vec<RenderJob>> {
        let models = RenderJobs::find()
            .filter(render_jobs::Column::TargetId.eq(target_id))
            .order_by_desc(render_jobs::Column::ScheduledFor)
            .all(&*self.connection)
            .await?;
        models.into_iter().map(|m| self.to_domain(m)).collect()
    }

    /// Due pending jobs, at most one per target
    ///
    /// Rows come back priority descending then `scheduled_for` ascending; for
    /// each target only its first row in that order is returned. Targets in
    /// `exclude`, or with a row already `processing`, are skipped.
    pub async fn find_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        exclude: &HashSet<Uuid>,
    ) -> RepositoryResult<Vec<RenderJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let processing: Vec<Uuid> = RenderJobs::find()
            .select_only()
            .column(render_jobs::Column::TargetId)
            .filter(render_jobs::Column::Status.eq(JobStatus::Processing.as_str()))
            .into_tuple()
            .all(&*self.connection)
            .await?;

        let mut seen: HashSet<Uuid> = exclude.iter().copied().chain(processing).collect();
        let page_size = (limit as u64).max(READY_PAGE_MIN);
        let mut pages = RenderJobs::find()
            .filter(render_jobs::Column::Status.eq(JobStatus::Pending.as_str()))
            .filter(render_jobs::Column::ScheduledFor.lte(now))
            .order_by_desc(render_jobs::Column::Priority)
            .order_by_asc(render_jobs::Column::ScheduledFor)
            .order_by_asc(render_jobs::Column::Id)
            .paginate(&*self.connection, page_size);

        let mut ready = Vec::with_capacity(limit);
        'pages: while let Some(models) = pages.fetch_and_next().await? {
            for model in models {
                if ready.len() >= limit {
                    break 'pages;
                }
                if seen.insert(model.target_id) {
                    ready.push(self.to_domain(model)?);
                }
            }
            if ready.len() >= limit {
                break;
            }
        }
        Ok(ready)
    }

    /// Claim a pending job for a worker
    ///
    /// Stamps `last_attempt` and increments `attempts`. Returns false when the
    /// row is no longer pending (cancelled or claimed elsewhere).
    pub async fn mark_processing(&self, id: Uuid) -> RepositoryResult<bool> {
        let now = Utc::now();
        let result = RenderJobs::update_many()
            .col_expr(
                render_jobs::Column::Status,
                Expr::value(JobStatus::Processing.as_str()),
            )
            .col_expr(render_jobs::Column::LastAttempt, Expr::value(Some(now)))
            .col_expr(
                render_jobs::Column::Attempts,
                Expr::col(render_jobs::Column::Attempts).add(1),
            )
            .col_expr(render_jobs::Column::UpdatedAt, Expr::value(now))
            .filter(render_jobs::Column::Id.eq(id))
            .filter(render_jobs::Column::Status.eq(JobStatus::Pending.as_str()))
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn mark_completed(&self, id: Uuid) -> RepositoryResult<()> {
        self.set_status(id, JobStatus::Completed, None).await
    }

    pub async fn mark_cancelled(&self, id: Uuid, reason: Option<String>) -> RepositoryResult<()> {
        self.set_status(id, JobStatus::Cancelled, reason).await
    }

    pub async fn mark_failed(&self, id: Uuid, error: String) -> RepositoryResult<()> {
        self.set_status(id, JobStatus::Failed, Some(error)).await
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> RepositoryResult<()> {
        RenderJobs::update_many()
            .col_expr(render_jobs::Column::Status, Expr::value(status.as_str()))
            .col_expr(render_jobs::Column::ErrorMessage, Expr::value(error_message))
            .col_expr(render_jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(render_jobs::Column::Id.eq(id))
            .exec(&*self.connection)
            .await?;
        Ok(())
    }

    /// Cancel one pending job; returns whether a row changed
    pub async fn cancel_pending(&self, id: Uuid) -> RepositoryResult<bool> {
        let result = RenderJobs::update_many()
            .col_expr(
                render_jobs::Column::Status,
                Expr::value(JobStatus::Cancelled.as_str()),
            )
            .col_expr(render_jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(render_jobs::Column::Id.eq(id))
            .filter(render_jobs::Column::Status.eq(JobStatus::Pending.as_str()))
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Cancel every pending job of a target, optionally sparing one id
    pub async fn cancel_pending_for_target(
        &self,
        target_id: Uuid,
        except: Option<Uuid>,
    ) -> RepositoryResult<u64> {
        let mut query = RenderJobs::update_many()
            .col_expr(
                render_jobs::Column::Status,
                Expr::value(JobStatus::Cancelled.as_str()),
            )
            .col_expr(render_jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(render_jobs::Column::TargetId.eq(target_id))
            .filter(render_jobs::Column::Status.eq(JobStatus::Pending.as_str()));
        if let Some(id) = except {
            query = query.filter(render_jobs::Column::Id.ne(id));
        }

        let result = query.exec(&*self.connection).await?;
        if result.rows_affected > 0 {
            debug!(
                "Cancelled {} pending job(s) for target {}",
                result.rows_affected, target_id
            );
        }
        Ok(result.rows_affected)
    }

    /// Whether the target has a pending or processing row
    pub async fn has_active_for_target(&self, target_id: Uuid) -> RepositoryResult<bool> {
        let count = RenderJobs::find()
            .filter(render_jobs::Column::TargetId.eq(target_id))
            .filter(render_jobs::Column::Status.is_in([
                JobStatus::Pending.as_str(),
                JobStatus::Processing.as_str(),
            ]))
            .count(&*self.connection)
            .await?;
        Ok(count > 0)
    }

    /// Put rows left `processing` by an interrupted run back to `pending`
    pub async fn requeue_interrupted(&self) -> RepositoryResult<u64> {
        let result = RenderJobs::update_many()
            .col_expr(
                render_jobs::Column::Status,
                Expr::value(JobStatus::Pending.as_str()),
            )
            .col_expr(render_jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(render_jobs::Column::Status.eq(JobStatus::Processing.as_str()))
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected)
    }

    /// Failed jobs still under the attempt cap
    pub async fn find_retryable(&self, max_attempts: i32) -> RepositoryResult<Vec<RenderJob>> {
        let models = RenderJobs::find()
            .filter(render_jobs::Column::Status.eq(JobStatus::Failed.as_str()))
            .filter(render_jobs::Column::Attempts.lt(max_attempts))
            .order_by_asc(render_jobs::Column::UpdatedAt)
            .all(&*self.connection)
            .await?;
        models.into_iter().map(|m| self.to_domain(m)).collect()
    }

    /// Reset a failed job to pending at `scheduled_for`, clearing its error
    pub async fn reset_for_retry(
        &self,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let result = RenderJobs::update_many()
            .col_expr(
                render_jobs::Column::Status,
                Expr::value(JobStatus::Pending.as_str()),
            )
            .col_expr(render_jobs::Column::ScheduledFor, Expr::value(scheduled_for))
            .col_expr(
                render_jobs::Column::ErrorMessage,
                Expr::value(Option::<String>::None),
            )
            .col_expr(render_jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(render_jobs::Column::Id.eq(id))
            .filter(render_jobs::Column::Status.eq(JobStatus::Failed.as_str()))
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Delete completed, cancelled and failed rows last touched before `cutoff`
    pub async fn delete_terminal_older_than(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = RenderJobs::delete_many()
            .filter(render_jobs::Column::Status.is_in([
                JobStatus::Completed.as_str(),
                JobStatus::Failed.as_str(),
                JobStatus::Cancelled.as_str(),
            ]))
            .filter(render_jobs::Column::UpdatedAt.lt(cutoff))
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn count_by_status(&self, status: JobStatus) -> RepositoryResult<u64> {
        Ok(RenderJobs::find()
            .filter(render_jobs::Column::Status.eq(status.as_str()))
            .count(&*self.connection)
            .await?)
    }

    pub async fn counts(&self) -> RepositoryResult<QueueCounts> {
        let oldest_pending = RenderJobs::find()
            .filter(render_jobs::Column::Status.eq(JobStatus::Pending.as_str()))
            .order_by_asc(render_jobs::Column::ScheduledFor)
            .one(&*self.connection)
            .await?
            .map(|m| m.scheduled_for);
        let due_pending = RenderJobs::find()
            .filter(render_jobs::Column::Status.eq(JobStatus::Pending.as_str()))
            .filter(render_jobs::Column::ScheduledFor.lte(Utc::now()))
            .count(&*self.connection)
            .await?;

        Ok(QueueCounts {
            pending: self.count_by_status(JobStatus::Pending).await?,
            due_pending,
            processing: self.count_by_status(JobStatus::Processing).await?,
            completed: self.count_by_status(JobStatus::Completed).await?,
            failed: self.count_by_status(JobStatus::Failed).await?,
            cancelled: self.count_by_status(JobStatus::Cancelled).await?,
            oldest_pending,
        })
    }

    /// Jobs matching any of `statuses` for a target
    pub async fn find_for_target_with_status(
        &self,
        target_id: Uuid,
        statuses: &[JobStatus],
    ) -> RepositoryResult<Vec<RenderJob>> {
        let condition = statuses
            .iter()
            .fold(Condition::any(), |cond, status| {
                cond.add(render_jobs::Column::Status.eq(status.as_str()))
            });
        let models = RenderJobs::find()
            .filter(render_jobs::Column::TargetId.eq(target_id))
            .filter(condition)
            .order_by_asc(render_jobs::Column::ScheduledFor)
            .all(&*self.connection)
            .await?;
        models.into_iter().map(|m| self.to_domain(m)).collect()
    }
}

impl EntityToDomain<render_jobs::Model, RenderJob> for RenderJobSeaOrmRepository {
    fn to_domain(&self, model: render_jobs::Model) -> RepositoryResult<RenderJob> {
        Ok(RenderJob {
            id: model.id,
            target_id: model.target_id,
            priority: model.priority,
            scheduled_for: model.scheduled_for,
            status: ConversionUtils::parse_column("status", &model.status)?,
            attempts: model.attempts,
            last_attempt: model.last_attempt,
            error_message: model.error_message,
            independent: model.independent,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::Duration;

    async fn repo() -> RenderJobSeaOrmRepository {
        let db = Database::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        RenderJobSeaOrmRepository::new(db.connection())
    }

    fn request(target_id: Uuid, priority: i32, scheduled_for: DateTime<Utc>) -> RenderJobCreateRequest {
        RenderJobCreateRequest {
            target_id,
            priority,
            scheduled_for,
            independent: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = repo().await;
        let target = Uuid::new_v4();
        let job = repo.create(request(target, 10, Utc::now())).await.unwrap();

        let found = repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(found.target_id, target);
        assert_eq!(found.status, JobStatus::Pending);
        assert_eq!(found.attempts, 0);
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_ready_one_per_target_in_priority_order() {
        let repo = repo().await;
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let a_low = repo.create(request(a, 10, now - Duration::minutes(10))).await.unwrap();
        let a_high = repo.create(request(a, 100, now - Duration::minutes(1))).await.unwrap();
        let b_job = repo.create(request(b, 10, now - Duration::minutes(20))).await.unwrap();
        // not yet due
        repo.create(request(Uuid::new_v4(), 100, now + Duration::minutes(5)))
            .await
            .unwrap();

        let ready = repo.find_ready(now, 10, &HashSet::new()).await.unwrap();
        let ids: Vec<Uuid> = ready.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a_high.id, b_job.id]);
        assert!(!ids.contains(&a_low.id));

        let limited = repo.find_ready(now, 1, &HashSet::new()).await.unwrap();
        assert_eq!(limited.len(), 1);

        let excluded = repo
            .find_ready(now, 10, &HashSet::from([a]))
            .await
            .unwrap();
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].id, b_job.id);
    }

    #[tokio::test]
    async fn test_find_ready_reads_past_a_page_of_one_target() {
        let repo = repo().await;
        let now = Utc::now();
        let busy = Uuid::new_v4();
        for i in 0..(READY_PAGE_MIN as i64 + 4) {
            repo.create(request(busy, 100, now - Duration::seconds(i + 1)))
                .await
                .unwrap();
        }
        let other = repo.create(request(Uuid::new_v4(), 10, now)).await.unwrap();
        repo.create(request(Uuid::new_v4(), 5, now)).await.unwrap();

        let ready = repo.find_ready(now, 2, &HashSet::new()).await.unwrap();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].target_id, busy);
        assert_eq!(ready[1].id, other.id);
    }

    #[tokio::test]
    async fn test_processing_target_is_not_ready() {
        let repo = repo().await;
        let now = Utc::now();
        let target = Uuid::new_v4();

        let first = repo.create(request(target, 10, now)).await.unwrap();
        repo.create(request(target, 10, now)).await.unwrap();
        assert!(repo.mark_processing(first.id).await.unwrap());

        let ready = repo.find_ready(now, 10, &HashSet::new()).await.unwrap();
        assert!(ready.is_empty());
    }

    #[tokio::test]
    async fn test_mark_processing_claims_once() {
        let repo = repo().await;
        let job = repo.create(request(Uuid::new_v4(), 10, Utc::now())).await.unwrap();

        assert!(repo.mark_processing(job.id).await.unwrap());
        assert!(!repo.mark_processing(job.id).await.unwrap());

        let claimed = repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.attempts, 1);
        assert!(claimed.last_attempt.is_some());
    }

    #[tokio::test]
    async fn test_cancel_pending_for_target_spares_one() {
        let repo = repo().await;
        let target = Uuid::new_v4();
        let keep = repo.create(request(target, 10, Utc::now())).await.unwrap();
        repo.create(request(target, 10, Utc::now())).await.unwrap();
        repo.create(request(target, 10, Utc::now())).await.unwrap();

        let cancelled = repo
            .cancel_pending_for_target(target, Some(keep.id))
            .await
            .unwrap();
        assert_eq!(cancelled, 2);
        assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 1);
        assert_eq!(repo.count_by_status(JobStatus::Cancelled).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retry_and_cleanup() {
        let repo = repo().await;
        let job = repo.create(request(Uuid::new_v4(), 10, Utc::now())).await.unwrap();
        repo.mark_processing(job.id).await.unwrap();
        repo.mark_failed(job.id, "boom".to_string()).await.unwrap();

        assert!(repo.find_retryable(1).await.unwrap().is_empty());
        let retryable = repo.find_retryable(3).await.unwrap();
        assert_eq!(retryable.len(), 1);

        let later = Utc::now() + Duration::minutes(5);
        assert!(repo.reset_for_retry(job.id, later).await.unwrap());
        let reset = repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(reset.status, JobStatus::Pending);
        assert!(reset.error_message.is_none());
        assert_eq!(reset.attempts, 1);

        repo.mark_completed(job.id).await.unwrap();
        assert_eq!(
            repo.delete_terminal_older_than(Utc::now() - Duration::hours(1))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            repo.delete_terminal_older_than(Utc::now() + Duration::seconds(1))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_counts_and_requeue() {
        let repo = repo().await;
        let now = Utc::now();
        let first = repo.create(request(Uuid::new_v4(), 10, now - Duration::minutes(3))).await.unwrap();
        repo.create(request(Uuid::new_v4(), 10, now)).await.unwrap();
        repo.create(request(Uuid::new_v4(), 10, now + Duration::hours(2))).await.unwrap();
        repo.mark_processing(first.id).await.unwrap();

        let counts = repo.counts().await.unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.due_pending, 1);
        assert_eq!(counts.processing, 1);
        assert!(counts.oldest_pending.is_some());

        assert_eq!(repo.requeue_interrupted().await.unwrap(), 1);
        assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 3);
    }
}
