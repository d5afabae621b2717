//! Domain models for the render queue and its artifacts

pub mod render_job;
pub mod rendered_content;

pub use render_job::{JobStatus, RenderJob};
pub use rendered_content::RenderedContent;
