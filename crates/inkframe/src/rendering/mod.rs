//! Per-job render orchestration

pub mod orchestrator;

pub use orchestrator::{JobOutcome, RenderOrchestrator};
