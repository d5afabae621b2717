pub use super::render_jobs::Entity as RenderJobs;
pub use super::rendered_contents::Entity as RenderedContents;
