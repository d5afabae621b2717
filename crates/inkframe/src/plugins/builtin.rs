//! Plugins bundled with the daemon

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::{PluginFactory, PluginRegistry, PluginRenderer, PluginResponse, RenderContext};
use crate::catalog::Target;
use crate::errors::PluginError;

pub const STATIC_IMAGE: &str = "static_image";
pub const URL_PASSTHROUGH: &str = "url_passthrough";

pub fn register_builtin_plugins(registry: &PluginRegistry) {
    registry.register(Arc::new(StaticImagePlugin));
    registry.register(Arc::new(UrlPassthroughPlugin));
}

fn string_setting(target: &Target, plugin_type: &str, key: &str) -> Result<String, PluginError> {
    target
        .settings
        .get(key)
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .ok_or_else(|| PluginError::InvalidSettings {
            plugin_type: plugin_type.to_string(),
            message: format!("missing string setting '{key}' on target {}", target.id),
        })
}

/// Serves an image file from disk (`settings.path`)
pub struct StaticImagePlugin;

struct StaticImageRenderer {
    path: PathBuf,
}

impl PluginFactory for StaticImagePlugin {
    fn plugin_type(&self) -> &str {
        STATIC_IMAGE
    }

    fn create(&self, target: &Target) -> Result<Arc<dyn PluginRenderer>, PluginError> {
        let path = string_setting(target, STATIC_IMAGE, "path")?;
        Ok(Arc::new(StaticImageRenderer {
            path: PathBuf::from(path),
        }))
    }
}

#[async_trait]
impl PluginRenderer for StaticImageRenderer {
    async fn render(&self, _context: &RenderContext) -> Result<PluginResponse, PluginError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(PluginResponse::ImageBytes(bytes))
    }
}

/// Points devices at an externally hosted image (`settings.url`)
pub struct UrlPassthroughPlugin;

struct UrlPassthroughRenderer {
    url: String,
}

impl PluginFactory for UrlPassthroughPlugin {
    fn plugin_type(&self) -> &str {
        URL_PASSTHROUGH
    }

    fn requires_processing(&self) -> bool {
        false
    }

    fn create(&self, target: &Target) -> Result<Arc<dyn PluginRenderer>, PluginError> {
        let url = string_setting(target, URL_PASSTHROUGH, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PluginError::InvalidSettings {
                plugin_type: URL_PASSTHROUGH.to_string(),
                message: format!("'{url}' is not an http(s) URL"),
            });
        }
        Ok(Arc::new(UrlPassthroughRenderer { url }))
    }
}

#[async_trait]
impl PluginRenderer for UrlPassthroughRenderer {
    async fn render(&self, _context: &RenderContext) -> Result<PluginResponse, PluginError> {
        Ok(PluginResponse::ImageUrl(self.url.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Device, DeviceModel, TargetKind};
    use crate::imaging::{BitDepth, ResizeMode};
    use uuid::Uuid;

    fn target(plugin_type: &str, settings: serde_json::Value) -> Target {
        Target {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "t".to_string(),
            plugin_type: plugin_type.to_string(),
            is_active: true,
            refresh_interval_minutes: 15,
            kind: TargetKind::Single,
            settings,
        }
    }

    fn context(target: Target) -> RenderContext {
        RenderContext {
            target,
            device: Device {
                id: Uuid::new_v4(),
                name: "d".to_string(),
                model: DeviceModel {
                    name: "m".to_string(),
                    screen_width: 8,
                    screen_height: 8,
                    bit_depth: BitDepth::One,
                    resize: ResizeMode::Fit,
                },
                target_ids: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_static_image_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        std::fs::write(&path, b"bytes").unwrap();

        let target = target(STATIC_IMAGE, serde_json::json!({ "path": path }));
        let renderer = StaticImagePlugin.create(&target).unwrap();
        let response = renderer.render(&context(target)).await.unwrap();
        assert_eq!(response, PluginResponse::ImageBytes(b"bytes".to_vec()));
    }

    #[tokio::test]
    async fn test_static_image_missing_file_is_io_error() {
        let target = target(STATIC_IMAGE, serde_json::json!({ "path": "/nonexistent/x.png" }));
        let renderer = StaticImagePlugin.create(&target).unwrap();
        assert!(matches!(
            renderer.render(&context(target)).await,
            Err(PluginError::Io(_))
        ));
    }

    #[test]
    fn test_settings_are_validated() {
        let missing = target(STATIC_IMAGE, serde_json::Value::Null);
        assert!(matches!(
            StaticImagePlugin.create(&missing),
            Err(PluginError::InvalidSettings { .. })
        ));

        let bad_url = target(URL_PASSTHROUGH, serde_json::json!({ "url": "ftp://x" }));
        assert!(UrlPassthroughPlugin.create(&bad_url).is_err());
    }

    #[tokio::test]
    async fn test_url_passthrough() {
        let target = target(
            URL_PASSTHROUGH,
            serde_json::json!({ "url": "https://example.com/a.png" }),
        );
        let renderer = UrlPassthroughPlugin.create(&target).unwrap();
        assert_eq!(
            renderer.render(&context(target)).await.unwrap(),
            PluginResponse::ImageUrl("https://example.com/a.png".to_string())
        );
    }
}
