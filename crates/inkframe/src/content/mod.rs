//! Rendered artifact storage, deduplication and retention

pub mod storage;
pub mod store;

pub use storage::ArtifactStorage;
pub use store::{ContentStore, StoreOutcome, content_hash};
