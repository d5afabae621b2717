//! Targets, owners and devices
//!
//! The render core never owns these records; it reads them through
//! [`TargetCatalog`]. [`InMemoryCatalog`] is the bundled implementation,
//! loadable from a TOML file for standalone runs and used by tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::imaging::{BitDepth, ResizeMode};

/// A configured content-source instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub plugin_type: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Minutes between renders; see `RefreshInterval` for the daily slots
    pub refresh_interval_minutes: i32,
    #[serde(default)]
    pub kind: TargetKind,
    /// Plugin specific settings
    #[serde(default)]
    pub settings: serde_json::Value,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetKind {
    #[default]
    Single,
    /// Composite of child targets; its refresh interval is derived from them
    Mashup { children: Vec<Uuid> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    /// IANA timezone name
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceModel {
    pub name: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub bit_depth: BitDepth,
    #[serde(default)]
    pub resize: ResizeMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    pub model: DeviceModel,
    /// Targets this device currently displays
    #[serde(default)]
    pub target_ids: Vec<Uuid>,
}

/// Read access to targets and the devices showing them
#[async_trait]
pub trait TargetCatalog: Send + Sync {
    async fn find_target(&self, id: Uuid) -> Result<Option<Target>>;

    async fn find_user(&self, id: Uuid) -> Result<Option<UserProfile>>;

    /// Devices currently configured to display `target_id`
    async fn devices_for_target(&self, target_id: Uuid) -> Result<Vec<Device>>;

    /// Store a new refresh interval; returns false if the target is unknown
    async fn update_refresh_interval(&self, target_id: Uuid, minutes: i32) -> Result<bool>;

    async fn list_active_targets(&self) -> Result<Vec<Target>>;
}

/// Shape of the catalog TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Default)]
pub struct InMemoryCatalog {
    users: RwLock<HashMap<Uuid, UserProfile>>,
    targets: RwLock<HashMap<Uuid, Target>>,
    devices: RwLock<HashMap<Uuid, Device>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file_contents(contents: CatalogFile) -> Self {
        Self {
            users: RwLock::new(contents.users.into_iter().map(|u| (u.id, u)).collect()),
            targets: RwLock::new(contents.targets.into_iter().map(|t| (t.id, t)).collect()),
            devices: RwLock::new(contents.devices.into_iter().map(|d| (d.id, d)).collect()),
        }
    }

    /// Load users, targets and devices from a TOML file
    ///
    /// A missing file yields an empty catalog.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Catalog file {} not found, starting empty", path.display());
            return Ok(Self::new());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
        let contents: CatalogFile = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;

        info!(
            "Loaded catalog from {}: {} user(s), {} target(s), {} device(s)",
            path.display(),
            contents.users.len(),
            contents.targets.len(),
            contents.devices.len()
        );
        Ok(Self::from_file_contents(contents))
    }

    pub async fn upsert_user(&self, user: UserProfile) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn upsert_target(&self, target: Target) {
        self.targets.write().await.insert(target.id, target);
    }

    pub async fn upsert_device(&self, device: Device) {
        self.devices.write().await.insert(device.id, device);
    }

    pub async fn set_target_active(&self, target_id: Uuid, active: bool) -> bool {
        match self.targets.write().await.get_mut(&target_id) {
            Some(target) => {
                target.is_active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TargetCatalog for InMemoryCatalog {
    async fn find_target(&self, id: Uuid) -> Result<Option<Target>> {
        Ok(self.targets.read().await.get(&id).cloned())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn devices_for_target(&self, target_id: Uuid) -> Result<Vec<Device>> {
        let mut devices: Vec<Device> = self
            .devices
            .read()
            .await
            .values()
            .filter(|d| d.target_ids.contains(&target_id))
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }

    async fn update_refresh_interval(&self, target_id: Uuid, minutes: i32) -> Result<bool> {
        match self.targets.write().await.get_mut(&target_id) {
            Some(target) => {
                target.refresh_interval_minutes = minutes;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_active_targets(&self) -> Result<Vec<Target>> {
        let mut targets: Vec<Target> = self
            .targets
            .read()
            .await
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(targets)
    }
}
