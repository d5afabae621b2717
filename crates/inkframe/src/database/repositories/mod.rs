//! SeaORM repository implementations for the render queue tables

pub mod render_job;
pub mod rendered_content;
pub mod traits;

pub use render_job::{QueueCounts, RenderJobCreateRequest, RenderJobSeaOrmRepository};
pub use rendered_content::{RenderedContentCreateRequest, RenderedContentSeaOrmRepository};
