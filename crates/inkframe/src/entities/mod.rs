//! SeaORM entities for the render queue tables

pub mod prelude;

pub mod render_jobs;
pub mod rendered_contents;
