//! Job status notifications
//!
//! Every status change the worker pool observes is published as a
//! [`JobEvent`] keyed by the owning user. Delivery to clients is outside this
//! crate; [`BroadcastEventSink`] exposes a channel external transports can
//! subscribe to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::models::JobStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub target_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub trait JobEventSink: Send + Sync {
    fn publish(&self, user_id: Uuid, event: JobEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl JobEventSink for NoopEventSink {
    fn publish(&self, _user_id: Uuid, _event: JobEvent) {}
}

/// Fans events out over a `tokio::sync::broadcast` channel
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<(Uuid, JobEvent)>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(Uuid, JobEvent)> {
        self.sender.subscribe()
    }
}

impl JobEventSink for BroadcastEventSink {
    fn publish(&self, user_id: Uuid, event: JobEvent) {
        // no subscribers is not an error
        if self.sender.send((user_id, event)).is_err() {
            trace!("No subscribers for job event of user {}", user_id);
        }
    }
}
