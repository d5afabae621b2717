use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::imaging::BitDepth;

/// Stored artifact for one (target, device) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedContent {
    pub id: Uuid,
    pub target_id: Uuid,
    pub device_id: Uuid,
    pub width: u32,
    pub height: u32,
    pub bit_depth: BitDepth,
    pub image_path: String,
    pub file_size: i64,
    /// SHA-256 of the encoded PNG, lowercase hex
    pub content_hash: String,
    pub previous_hash: Option<String>,
    pub rendered_at: DateTime<Utc>,
    /// Set when a later render produced identical bytes
    pub last_checked_at: Option<DateTime<Utc>>,
    pub render_attempts: i32,
}

impl RenderedContent {
    /// Last time this artifact was known to be current
    pub fn last_confirmed_at(&self) -> DateTime<Utc> {
        self.last_checked_at.unwrap_or(self.rendered_at)
    }
}
