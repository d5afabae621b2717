//! Artifact files on disk

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

const ARTIFACT_EXTENSION: &str = "png";

/// Directory holding encoded artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStorage {
    base_dir: PathBuf,
}

impl ArtifactStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `{target}_{device}_{random}.png` inside the base directory
    pub fn artifact_path(&self, target_id: Uuid, device_id: Uuid) -> PathBuf {
        let suffix = hex::encode(rand::random::<[u8; 8]>());
        self.base_dir.join(format!(
            "{target_id}_{device_id}_{suffix}.{ARTIFACT_EXTENSION}"
        ))
    }

    /// Write bytes to a fresh artifact file and return its path
    pub async fn write(&self, target_id: Uuid, device_id: Uuid, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.base_dir).await?;
        let path = self.artifact_path(target_id, device_id);
        fs::write(&path, bytes).await?;
        debug!("Wrote artifact {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Remove a file; a missing file is not an error
    pub async fn remove(&self, path: impl AsRef<Path>) -> io::Result<()> {
        match fs::remove_file(path.as_ref()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Artifact files older than `min_age`
    ///
    /// A missing base directory yields an empty list.
    pub async fn list_files(&self, min_age: Duration) -> io::Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ARTIFACT_EXTENSION) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age >= min_age {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_list_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ArtifactStorage::new(dir.path().join("rendered"));
        let (target, device) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(storage.list_files(Duration::ZERO).await.unwrap().is_empty());

        let first = storage.write(target, device, b"one").await.unwrap();
        let second = storage.write(target, device, b"two").await.unwrap();
        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(&format!("{target}_{device}_")));
        assert!(name.ends_with(".png"));

        // non-artifact files are ignored
        std::fs::write(storage.base_dir().join("notes.txt"), b"x").unwrap();
        assert_eq!(storage.list_files(Duration::ZERO).await.unwrap().len(), 2);
        assert!(
            storage
                .list_files(Duration::from_secs(3600))
                .await
                .unwrap()
                .is_empty()
        );

        storage.remove(&first).await.unwrap();
        storage.remove(&first).await.unwrap();
        assert_eq!(storage.list_files(Duration::ZERO).await.unwrap(), vec![second]);
    }
}
