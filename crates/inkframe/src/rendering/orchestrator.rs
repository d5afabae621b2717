//! Render orchestration for a single job
//!
//! A job resolves its target, fans out over every device showing it, runs
//! the plugin, encodes image bytes for the device panel and hands the result
//! to the content store. Device failures are logged and counted but never
//! fail the job; only failures before the device loop do.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{Device, Target, TargetCatalog};
use crate::content::{ContentStore, StoreOutcome};
use crate::errors::RenderError;
use crate::events::{JobEvent, JobEventSink};
use crate::imaging::{EncodeOptions, ImageEncoder};
use crate::job_scheduling::QueueManager;
use crate::models::{JobStatus, RenderJob};
use crate::plugins::{PluginRegistry, PluginRenderer, PluginResponse, RenderContext};

/// What happened to a job that ran to a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub user_id: Option<Uuid>,
    pub rendered: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub message: String,
}

impl JobOutcome {
    fn new(status: JobStatus, user_id: Option<Uuid>, message: impl Into<String>) -> Self {
        Self {
            status,
            user_id,
            rendered: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
            message: message.into(),
        }
    }

    fn summarize(&mut self) {
        let total = self.rendered + self.unchanged + self.skipped + self.failed;
        self.message = format!(
            "{} rendered, {} unchanged, {} skipped, {} failed of {} device(s)",
            self.rendered, self.unchanged, self.skipped, self.failed, total
        );
    }
}

enum DeviceRender {
    Stored,
    Unchanged,
    Skipped,
}

pub struct RenderOrchestrator {
    catalog: Arc<dyn TargetCatalog>,
    registry: Arc<PluginRegistry>,
    encoder: ImageEncoder,
    content: ContentStore,
    queue: Arc<QueueManager>,
    events: Arc<dyn JobEventSink>,
}

impl RenderOrchestrator {
    pub fn new(
        catalog: Arc<dyn TargetCatalog>,
        registry: Arc<PluginRegistry>,
        content: ContentStore,
        queue: Arc<QueueManager>,
        events: Arc<dyn JobEventSink>,
    ) -> Self {
        Self {
            catalog,
            registry,
            encoder: ImageEncoder::new(),
            content,
            queue,
            events,
        }
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.content
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    /// Owning user of a target, if it can still be resolved
    pub async fn owner_of(&self, target_id: Uuid) -> Option<Uuid> {
        match self.catalog.find_target(target_id).await {
            Ok(target) => target.map(|t| t.user_id),
            Err(e) => {
                debug!("Could not resolve owner of target {}: {}", target_id, e);
                None
            }
        }
    }

    /// Run a job the caller has already claimed as `processing`
    ///
    /// `Ok` carries the terminal status the job row was moved to. `Err` means
    /// the job failed before any device was attempted; the row is left for
    /// the caller to mark failed.
    pub async fn process_job(&self, job: &RenderJob) -> Result<JobOutcome, RenderError> {
        let Some(target) = self
            .catalog
            .find_target(job.target_id)
            .await
            .map_err(RenderError::catalog)?
        else {
            return self.cancel(job, None, "target not found").await;
        };

        if !target.is_active {
            return self
                .cancel(job, Some(target.user_id), "target is inactive")
                .await;
        }

        let Some(factory) = self.registry.get(&target.plugin_type) else {
            let reason = format!(
                "plugin '{}' is not registered or disabled",
                target.plugin_type
            );
            return self.cancel(job, Some(target.user_id), reason).await;
        };

        let owner = self
            .catalog
            .find_user(target.user_id)
            .await
            .map_err(RenderError::catalog)?;
        if owner.is_none() {
            return Err(RenderError::OwnerNotFound {
                target_id: target.id,
                user_id: target.user_id,
            });
        }

        self.events.publish(
            target.user_id,
            JobEvent {
                job_id: job.id,
                target_id: target.id,
                status: JobStatus::Processing,
                message: format!("Rendering '{}'", target.name),
                timestamp: chrono::Utc::now(),
                error: None,
            },
        );

        let devices = self
            .catalog
            .devices_for_target(target.id)
            .await
            .map_err(RenderError::catalog)?;

        let mut outcome = JobOutcome::new(JobStatus::Completed, Some(target.user_id), "");
        if devices.is_empty() {
            debug!("Target {} has no devices, nothing to render", target.id);
        } else if !factory.requires_processing() {
            outcome.skipped = devices.len();
        } else {
            match factory.create(&target) {
                Ok(renderer) => {
                    for device in devices {
                        let device_id = device.id;
                        match self.render_device(&renderer, &target, device).await {
                            Ok(DeviceRender::Stored) => outcome.rendered += 1,
                            Ok(DeviceRender::Unchanged) => outcome.unchanged += 1,
                            Ok(DeviceRender::Skipped) => outcome.skipped += 1,
                            Err(e) => {
                                warn!(
                                    "Render of target {} for device {} failed: {}",
                                    target.id, device_id, e
                                );
                                outcome.failed += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to create '{}' renderer for target {}: {}",
                        target.plugin_type, target.id, e
                    );
                    outcome.failed = devices.len();
                }
            }
        }
        outcome.summarize();

        self.finish(job, &target).await?;

        info!(
            "Job {} for target '{}' completed: {}",
            job.id, target.name, outcome.message
        );
        Ok(outcome)
    }

    async fn render_device(
        &self,
        renderer: &Arc<dyn PluginRenderer>,
        target: &Target,
        device: Device,
    ) -> Result<DeviceRender, RenderError> {
        let device_id = device.id;
        let options = EncodeOptions::new(
            device.model.screen_width,
            device.model.screen_height,
            device.model.bit_depth,
        )
        .with_resize(device.model.resize);
        let context = RenderContext {
            target: target.clone(),
            device,
        };

        match renderer.render(&context).await? {
            PluginResponse::NoChange => {
                debug!(
                    "No data change for target {} on device {}",
                    target.id, device_id
                );
                self.content.confirm_current(target.id, device_id).await?;
                Ok(DeviceRender::Unchanged)
            }
            PluginResponse::ImageUrl(url) => {
                debug!(
                    "Target {} serves {} to device {} directly",
                    target.id, url, device_id
                );
                Ok(DeviceRender::Skipped)
            }
            PluginResponse::ImageBytes(raw) => {
                let encoder = self.encoder;
                let image =
                    tokio::task::spawn_blocking(move || encoder.encode(&raw, &options)).await??;

                match self.content.store(target.id, device_id, &image).await? {
                    StoreOutcome::Unchanged(_) => Ok(DeviceRender::Unchanged),
                    StoreOutcome::Stored(_) => Ok(DeviceRender::Stored),
                }
            }
        }
    }

    /// Complete the job, drop duplicate pending rows and book the next run
    async fn finish(&self, job: &RenderJob, target: &Target) -> Result<(), RenderError> {
        let repository = self.queue.repository();
        repository.mark_completed(job.id).await?;
        // the job is completed from here on; later failures are only logged
        if let Err(e) = repository
            .cancel_pending_for_target(target.id, Some(job.id))
            .await
        {
            warn!(
                "Failed to cancel duplicate pending jobs for target {}: {}",
                target.id, e
            );
        }

        if !job.independent {
            match self.queue.schedule_next(target.id).await {
                Ok(Some(next)) => debug!(
                    "Next render of target {} at {}",
                    target.id,
                    next.scheduled_for.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                Ok(None) => {}
                Err(e) => warn!(
                    "Failed to schedule next render for target {}: {}",
                    target.id, e
                ),
            }
        }
        Ok(())
    }

    async fn cancel(
        &self,
        job: &RenderJob,
        user_id: Option<Uuid>,
        reason: impl Into<String>,
    ) -> Result<JobOutcome, RenderError> {
        let reason = reason.into();
        info!(
            "Cancelling job {} for target {}: {}",
            job.id, job.target_id, reason
        );
        self.queue
            .repository()
            .mark_cancelled(job.id, Some(reason.clone()))
            .await?;
        Ok(JobOutcome::new(JobStatus::Cancelled, user_id, reason))
    }
}
