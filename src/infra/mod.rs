//! Infrastructure adapters for task-store persistence.

pub mod store;

pub use store::{InMemoryBackend, JsonlBackend};
