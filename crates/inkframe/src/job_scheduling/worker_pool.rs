//! Fixed-size render worker pool
//!
//! Workers share one bounded job channel. A feeder promotes due rows from the
//! store into that channel on a fixed tick, backing off while the channel is
//! above its fill threshold. Every claimed job produces exactly one
//! [`JobResult`] on a second channel drained by a single result processor.
//!
//! Shutdown cancels the feeder and tickers, waits a grace period, then closes
//! the job channel. Workers finish what they hold and whatever is still
//! buffered before exiting; rows never handed off stay `pending` in the store.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::monitoring::{HealthMonitor, HealthReport};
use super::queue_manager::QueueManager;
use super::types::{JobResult, MetricsSnapshot, PoolMetrics};
use crate::config::{Config, MonitoringConfig, WorkerPoolConfig};
use crate::errors::JobSchedulingError;
use crate::events::{JobEvent, JobEventSink};
use crate::models::{JobStatus, RenderJob};
use crate::rendering::RenderOrchestrator;

/// Non-blocking handle for pushing jobs into the pool's channel
///
/// Holds only a weak sender, so outstanding submitters never keep the
/// channel open past [`WorkerPool::stop`].
#[derive(Clone)]
pub struct JobSubmitter {
    sender: mpsc::WeakSender<RenderJob>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    metrics: Arc<PoolMetrics>,
}

impl JobSubmitter {
    /// Try to hand a job to the workers without waiting
    ///
    /// Returns false when the channel is full or closed, or when the job's
    /// target is already queued or running. Nothing changes in that case.
    pub fn try_submit(&self, job: RenderJob) -> bool {
        let Some(sender) = self.sender.upgrade() else {
            return false;
        };

        let mut in_flight = self.in_flight();
        if in_flight.contains(&job.target_id) {
            return false;
        }

        let target_id = job.target_id;
        match sender.try_send(job) {
            Ok(()) => {
                in_flight.insert(target_id);
                self.metrics
                    .set_queue_length(sender.max_capacity() - sender.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                debug!("Job channel full, job {} left for a later pass", job.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Jobs waiting in the channel
    pub fn queue_len(&self) -> usize {
        self.sender
            .upgrade()
            .map(|sender| sender.max_capacity() - sender.capacity())
            .unwrap_or(0)
    }

    pub fn is_in_flight(&self, target_id: Uuid) -> bool {
        self.in_flight().contains(&target_id)
    }

    fn in_flight_targets(&self) -> HashSet<Uuid> {
        self.in_flight().clone()
    }

    fn release(&self, target_id: Uuid) {
        self.in_flight().remove(&target_id);
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// State shared by every task the pool spawns
struct PoolShared {
    config: WorkerPoolConfig,
    content_max_age: Duration,
    queue: Arc<QueueManager>,
    orchestrator: Arc<RenderOrchestrator>,
    events: Arc<dyn JobEventSink>,
    metrics: Arc<PoolMetrics>,
    submitter: JobSubmitter,
    monitor: HealthMonitor,
}

enum PoolState {
    Idle,
    Running(RunningPool),
    Stopped,
}

struct RunningPool {
    cancel: CancellationToken,
    background: JoinSet<()>,
    workers: JoinSet<()>,
    result_sender: mpsc::Sender<JobResult>,
    result_processor: JoinHandle<()>,
}

pub struct WorkerPool {
    shared: Arc<PoolShared>,
    job_sender: Mutex<Option<mpsc::Sender<RenderJob>>>,
    job_receiver: Arc<AsyncMutex<mpsc::Receiver<RenderJob>>>,
    state: AsyncMutex<PoolState>,
}

impl WorkerPool {
    pub fn new(
        config: &Config,
        orchestrator: Arc<RenderOrchestrator>,
        events: Arc<dyn JobEventSink>,
    ) -> Self {
        Self::with_settings(
            config.worker_pool.clone(),
            config.monitoring.clone(),
            config.storage.content_max_age,
            orchestrator,
            events,
        )
    }

    pub fn with_settings(
        config: WorkerPoolConfig,
        monitoring: MonitoringConfig,
        content_max_age: Duration,
        orchestrator: Arc<RenderOrchestrator>,
        events: Arc<dyn JobEventSink>,
    ) -> Self {
        let (job_sender, job_receiver) = mpsc::channel(config.job_buffer.max(1));
        let metrics = Arc::new(PoolMetrics::new());
        let submitter = JobSubmitter {
            sender: job_sender.downgrade(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            metrics: metrics.clone(),
        };
        let monitor = HealthMonitor::new(monitoring, config.workers, config.job_buffer);

        Self {
            shared: Arc::new(PoolShared {
                queue: orchestrator.queue().clone(),
                config,
                content_max_age,
                orchestrator,
                events,
                metrics,
                submitter,
                monitor,
            }),
            job_sender: Mutex::new(Some(job_sender)),
            job_receiver: Arc::new(AsyncMutex::new(job_receiver)),
            state: AsyncMutex::new(PoolState::Idle),
        }
    }

    pub fn submitter(&self) -> JobSubmitter {
        self.shared.submitter.clone()
    }

    /// Direct, non-blocking submission; false on a full channel
    pub fn submit_job(&self, job: RenderJob) -> bool {
        self.shared.submitter.try_submit(job)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, PoolState::Running(_))
    }

    /// Current health classification
    pub async fn health(&self) -> Result<HealthReport, JobSchedulingError> {
        self.shared.health().await
    }

    /// Launch workers, feeder, result processor and the maintenance tickers
    pub async fn start(&self) -> Result<(), JobSchedulingError> {
        let mut state = self.state.lock().await;
        match *state {
            PoolState::Idle => {}
            PoolState::Running(_) => return Err(JobSchedulingError::AlreadyRunning),
            PoolState::Stopped => return Err(JobSchedulingError::PoolClosed),
        }

        let requeued = self.shared.queue.repository().requeue_interrupted().await?;
        if requeued > 0 {
            info!("Requeued {} job(s) interrupted by a previous shutdown", requeued);
        }

        let config = &self.shared.config;
        info!(
            "Starting worker pool with {} workers (job buffer {}, feed every {:?})",
            config.workers, config.job_buffer, config.feed_interval
        );

        let cancel = CancellationToken::new();
        let (result_sender, result_receiver) = mpsc::channel(config.result_buffer.max(1));

        let result_processor = tokio::spawn(process_results(self.shared.clone(), result_receiver));

        let mut workers = JoinSet::new();
        for worker_id in 0..config.workers {
            workers.spawn(run_worker(
                worker_id,
                self.shared.clone(),
                self.job_receiver.clone(),
                result_sender.clone(),
            ));
        }

        let mut background = JoinSet::new();
        background.spawn(run_feeder(self.shared.clone(), cancel.clone()));
        background.spawn(run_cleanup(self.shared.clone(), cancel.clone()));
        background.spawn(run_monitor(self.shared.clone(), cancel.clone()));

        *state = PoolState::Running(RunningPool {
            cancel,
            background,
            workers,
            result_sender,
            result_processor,
        });
        Ok(())
    }

    /// Stop the pool; in-flight and buffered jobs run to completion
    pub async fn stop(&self) -> Result<(), JobSchedulingError> {
        let mut state = self.state.lock().await;
        let mut running = match std::mem::replace(&mut *state, PoolState::Stopped) {
            PoolState::Running(running) => running,
            other => {
                *state = other;
                return Err(JobSchedulingError::NotRunning);
            }
        };

        info!("Stopping worker pool");
        running.cancel.cancel();
        while let Some(joined) = running.background.join_next().await {
            if let Err(e) = joined {
                warn!("Worker pool background task ended abnormally: {}", e);
            }
        }

        tokio::time::sleep(self.shared.config.shutdown_grace).await;

        // last strong sender; workers exit once the buffer is drained
        drop(
            self.job_sender
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take(),
        );
        while let Some(joined) = running.workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task ended abnormally: {}", e);
            }
        }

        drop(running.result_sender);
        if let Err(e) = running.result_processor.await {
            error!("Result processor ended abnormally: {}", e);
        }

        let metrics = self.shared.metrics.snapshot();
        info!(
            "Worker pool stopped after {} job(s) ({} succeeded, {} failed)",
            metrics.total_jobs, metrics.success_jobs, metrics.failed_jobs
        );
        Ok(())
    }
}

impl PoolShared {
    /// Promote due rows into the channel while it has room
    async fn feed(&self) -> Result<usize, JobSchedulingError> {
        let capacity = self.config.job_buffer;
        let queued = self.submitter.queue_len();
        self.metrics.set_queue_length(queued);

        if queued as f64 >= capacity as f64 * self.config.feed_threshold {
            debug!(
                "Job channel at {}/{}, skipping feed tick",
                queued, capacity
            );
            return Ok(0);
        }

        let room = capacity.saturating_sub(queued);
        let exclude = self.submitter.in_flight_targets();
        let jobs = self
            .queue
            .repository()
            .find_ready(Utc::now(), self.config.feed_batch_size.min(room), &exclude)
            .await?;

        let mut submitted = 0;
        for job in jobs {
            if self.submitter.try_submit(job) {
                submitted += 1;
            }
        }
        if submitted > 0 {
            debug!("Feeder submitted {} job(s)", submitted);
        }
        Ok(submitted)
    }

    /// Claim, run and adjudicate one job
    async fn execute(&self, job: RenderJob) -> Option<JobResult> {
        let repository = self.queue.repository();
        match repository.mark_processing(job.id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Job {} is no longer pending, dropping it", job.id);
                self.submitter.release(job.target_id);
                return None;
            }
            Err(e) => {
                error!("Failed to claim job {}: {}", job.id, e);
                self.submitter.release(job.target_id);
                return None;
            }
        }

        let started = Instant::now();
        self.metrics.job_started();
        let processed = self.orchestrator.process_job(&job).await;
        self.metrics.job_finished();
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match processed {
            Ok(outcome) => JobResult {
                job_id: job.id,
                target_id: job.target_id,
                user_id: outcome.user_id,
                success: outcome.status != JobStatus::Failed,
                status: outcome.status,
                error: None,
                message: outcome.message,
                duration_ms,
            },
            Err(e) => {
                let message = e.to_string();
                warn!("Job {} for target {} failed: {}", job.id, job.target_id, message);
                if let Err(mark_err) = repository.mark_failed(job.id, message.clone()).await {
                    error!("Failed to mark job {} as failed: {}", job.id, mark_err);
                }
                JobResult {
                    job_id: job.id,
                    target_id: job.target_id,
                    user_id: self.orchestrator.owner_of(job.target_id).await,
                    success: false,
                    status: JobStatus::Failed,
                    error: Some(message),
                    message: "Render failed".to_string(),
                    duration_ms,
                }
            }
        };
        Some(result)
    }

    fn record(&self, result: JobResult) {
        self.metrics.record_result(result.success);
        self.submitter.release(result.target_id);

        debug!(
            "Job {} finished as {} in {}ms",
            result.job_id, result.status, result.duration_ms
        );

        if let Some(user_id) = result.user_id {
            self.events.publish(
                user_id,
                JobEvent {
                    job_id: result.job_id,
                    target_id: result.target_id,
                    status: result.status,
                    message: result.message,
                    timestamp: Utc::now(),
                    error: result.error,
                },
            );
        }
    }

    async fn cleanup(&self) {
        if let Err(e) = self.queue.cleanup_jobs().await {
            error!("Job cleanup failed: {}", e);
        }

        let content = self.orchestrator.content_store();
        match content.sweep_orphans().await {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} orphaned artifact file(s)", removed),
            Err(e) => error!("Orphan sweep failed: {}", e),
        }
        match content.cleanup_stale(self.content_max_age).await {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} stale artifact(s)", removed),
            Err(e) => error!("Stale artifact cleanup failed: {}", e),
        }
    }

    async fn health(&self) -> Result<HealthReport, JobSchedulingError> {
        self.metrics.set_queue_length(self.submitter.queue_len());
        let stats = self.queue.stats().await?;
        Ok(self.monitor.evaluate(self.metrics.snapshot(), stats))
    }
}

async fn run_worker(
    worker_id: usize,
    shared: Arc<PoolShared>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<RenderJob>>>,
    results: mpsc::Sender<JobResult>,
) {
    shared.metrics.worker_started();
    debug!("Worker {} started", worker_id);

    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            let job = receiver.recv().await;
            shared.metrics.set_queue_length(receiver.len());
            job
        };
        let Some(job) = job else {
            break;
        };

        debug!("Worker {} picked up job {}", worker_id, job.id);
        if let Some(result) = shared.execute(job).await
            && let Err(e) = results.send(result).await
        {
            error!("Result channel closed, dropping result of job {}", e.0.job_id);
        }
    }

    shared.metrics.worker_stopped();
    debug!("Worker {} stopped", worker_id);
}

async fn process_results(shared: Arc<PoolShared>, mut results: mpsc::Receiver<JobResult>) {
    while let Some(result) = results.recv().await {
        shared.record(result);
    }
    debug!("Result processor stopped");
}

async fn run_feeder(shared: Arc<PoolShared>, cancel: CancellationToken) {
    let mut ticker = interval(shared.config.feed_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = shared.feed().await {
                    error!("Feeder failed to load ready jobs: {}", e);
                }
            }
            _ = cancel.cancelled() => {
                debug!("Feeder received cancellation signal");
                break;
            }
        }
    }
}

async fn run_cleanup(shared: Arc<PoolShared>, cancel: CancellationToken) {
    let mut ticker = interval(shared.config.cleanup_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // no sweep right at startup
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => shared.cleanup().await,
            _ = cancel.cancelled() => break,
        }
    }
}

async fn run_monitor(shared: Arc<PoolShared>, cancel: CancellationToken) {
    let mut ticker = interval(shared.config.monitor_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => match shared.health().await {
                Ok(report) => shared.monitor.log_report(&report),
                Err(e) => warn!("Health check failed: {}", e),
            },
            _ = cancel.cancelled() => break,
        }
    }
}
