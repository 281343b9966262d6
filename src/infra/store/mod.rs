//! Task-store persistence backends.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlBackend;
pub use memory::InMemoryBackend;
