//! Content deduplication and "latest + 1 previous" retention
//!
//! Each (target, device) pair keeps at most two artifact rows. A render whose
//! encoded bytes hash to the same value as the newest row writes nothing and
//! only refreshes that row's `last_checked_at`.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::storage::ArtifactStorage;
use crate::database::repositories::{
    RenderedContentCreateRequest, RenderedContentSeaOrmRepository,
};
use crate::errors::RenderError;
use crate::imaging::EncodedImage;
use crate::models::RenderedContent;

/// Rows kept per (target, device) pair
pub const RETAINED_ARTIFACTS: usize = 2;

/// Files younger than this are never treated as orphans; a render may have
/// written the file without inserting its row yet.
const ORPHAN_MIN_AGE: Duration = Duration::from_secs(300);

/// SHA-256 of encoded bytes, lowercase hex
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Result of storing one encoded render
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// Identical to the newest artifact; only its check time was refreshed
    Unchanged(Uuid),
    /// New artifact written
    Stored(RenderedContent),
}

#[derive(Clone)]
pub struct ContentStore {
    repository: RenderedContentSeaOrmRepository,
    storage: ArtifactStorage,
}

impl ContentStore {
    pub fn new(repository: RenderedContentSeaOrmRepository, storage: ArtifactStorage) -> Self {
        Self {
            repository,
            storage,
        }
    }

    pub fn storage(&self) -> &ArtifactStorage {
        &self.storage
    }

    /// Persist an encoded image unless it matches the newest artifact
    pub async fn store(
        &self,
        target_id: Uuid,
        device_id: Uuid,
        image: &EncodedImage,
    ) -> Result<StoreOutcome, RenderError> {
        let hash = content_hash(&image.bytes);
        let latest = self.repository.latest_for(target_id, device_id).await?;

        if let Some(existing) = &latest
            && existing.content_hash == hash
        {
            self.repository.touch_checked(existing.id).await?;
            debug!(
                "Content unchanged for target {} device {} ({})",
                target_id,
                device_id,
                &hash[..12]
            );
            return Ok(StoreOutcome::Unchanged(existing.id));
        }

        let path = self
            .storage
            .write(target_id, device_id, &image.bytes)
            .await?;
        let request = RenderedContentCreateRequest {
            target_id,
            device_id,
            width: image.width,
            height: image.height,
            bit_depth: image.bit_depth,
            image_path: path.to_string_lossy().to_string(),
            file_size: image.bytes.len() as i64,
            content_hash: hash,
            previous_hash: latest.map(|c| c.content_hash),
        };

        let content = match self.repository.create(request).await {
            Ok(content) => content,
            Err(e) => {
                // the row never landed; do not leave the file behind
                if let Err(remove_err) = self.storage.remove(&path).await {
                    warn!("Failed to remove {}: {}", path.display(), remove_err);
                }
                return Err(e.into());
            }
        };

        let pruned = self.enforce_retention(target_id, device_id).await?;
        debug!(
            "Stored new content for target {} device {} at {} (pruned {})",
            target_id, device_id, content.image_path, pruned
        );
        Ok(StoreOutcome::Stored(content))
    }

    /// Delete every artifact of the pair beyond the newest two
    pub async fn enforce_retention(
        &self,
        target_id: Uuid,
        device_id: Uuid,
    ) -> Result<usize, RenderError> {
        let contents = self.repository.list_for(target_id, device_id).await?;
        let mut pruned = 0;
        for content in contents.into_iter().skip(RETAINED_ARTIFACTS) {
            self.remove_artifact(&content).await?;
            pruned += 1;
        }
        Ok(pruned)
    }

    /// Delete artifact files that no row references
    pub async fn sweep_orphans(&self) -> Result<usize, RenderError> {
        self.sweep_orphans_older_than(ORPHAN_MIN_AGE).await
    }

    pub async fn sweep_orphans_older_than(&self, min_age: Duration) -> Result<usize, RenderError> {
        let known: HashSet<String> = self
            .repository
            .all_image_paths()
            .await?
            .into_iter()
            .collect();

        let mut removed = 0;
        for path in self.storage.list_files(min_age).await? {
            if known.contains(path.to_string_lossy().as_ref()) {
                continue;
            }
            self.storage.remove(&path).await?;
            removed += 1;
        }

        if removed > 0 {
            info!("Removed {} orphaned artifact file(s)", removed);
        }
        Ok(removed)
    }

    /// Mark the newest artifact of a pair as still current
    ///
    /// Used when a plugin reports no data change. Returns the confirmed row,
    /// or `None` when the pair has never been rendered.
    pub async fn confirm_current(
        &self,
        target_id: Uuid,
        device_id: Uuid,
    ) -> Result<Option<Uuid>, RenderError> {
        let Some(latest) = self.repository.latest_for(target_id, device_id).await? else {
            return Ok(None);
        };
        self.repository.touch_checked(latest.id).await?;
        Ok(Some(latest.id))
    }

    /// Delete artifacts not confirmed current within `max_age`
    ///
    /// The newest artifact of each (target, device) pair is never removed,
    /// so a device always keeps something to display.
    pub async fn cleanup_stale(&self, max_age: Duration) -> Result<usize, RenderError> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return Ok(0);
        };

        let mut newest: HashMap<(Uuid, Uuid), Option<Uuid>> = HashMap::new();
        let mut removed = 0;
        for content in self.repository.find_stale(cutoff).await? {
            let pair = (content.target_id, content.device_id);
            let newest_id = match newest.get(&pair) {
                Some(id) => *id,
                None => {
                    let id = self
                        .repository
                        .latest_for(pair.0, pair.1)
                        .await?
                        .map(|latest| latest.id);
                    newest.insert(pair, id);
                    id
                }
            };
            if newest_id == Some(content.id) {
                continue;
            }
            self.remove_artifact(&content).await?;
            removed += 1;
        }

        if removed > 0 {
            info!("Removed {} stale artifact(s)", removed);
        }
        Ok(removed)
    }

    async fn remove_artifact(&self, content: &RenderedContent) -> Result<(), RenderError> {
        self.storage.remove(Path::new(&content.image_path)).await?;
        self.repository.delete(content.id).await?;
        Ok(())
    }
}
