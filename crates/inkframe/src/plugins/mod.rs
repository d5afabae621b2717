//! Content plugin contract
//!
//! A plugin turns a target plus one device context into a [`PluginResponse`].
//! How the content is produced is the plugin's business; the render core only
//! looks at the response variant:
//!
//! - **ImageBytes**: raw raster bytes to be encoded for the device
//! - **ImageUrl**: content the device fetches itself, nothing to store
//! - **NoChange**: upstream data has not changed since the last render
//!
//! Plugins are reached through an explicit [`PluginRegistry`] handed to the
//! orchestrator, never through global state.

pub mod builtin;
pub mod registry;

pub use builtin::{StaticImagePlugin, UrlPassthroughPlugin, register_builtin_plugins};
pub use registry::PluginRegistry;

use async_trait::async_trait;
use std::sync::Arc;

use crate::catalog::{Device, Target};
use crate::errors::PluginError;

/// What a plugin renders against
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub target: Target,
    pub device: Device,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginResponse {
    ImageBytes(Vec<u8>),
    ImageUrl(String),
    NoChange,
}

/// Renders one target for one device
#[async_trait]
pub trait PluginRenderer: Send + Sync {
    async fn render(&self, context: &RenderContext) -> Result<PluginResponse, PluginError>;
}

/// Builds renderers for one plugin type
pub trait PluginFactory: Send + Sync {
    /// Identifier matched against `Target::plugin_type`
    fn plugin_type(&self) -> &str;

    /// Whether output passes through the encoder and content store
    fn requires_processing(&self) -> bool {
        true
    }

    fn create(&self, target: &Target) -> Result<Arc<dyn PluginRenderer>, PluginError>;
}
