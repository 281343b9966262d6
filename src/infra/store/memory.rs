//! In-memory store backend for development and tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{StoreBackend, StoreError, StoreRecord};

/// Keeps records in a shared vector.
///
/// Clones share storage, so a test can hand one clone to a store and reopen
/// another store from the other to simulate a restart.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    records: Arc<Mutex<Vec<StoreRecord>>>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with `records`.
    pub fn with_records(records: Vec<StoreRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }

    /// Snapshot of what has been written.
    pub fn records(&self) -> Vec<StoreRecord> {
        self.records.lock().clone()
    }
}

impl StoreBackend for InMemoryBackend {
    fn load(&mut self) -> Result<Vec<StoreRecord>, StoreError> {
        Ok(self.records.lock().clone())
    }

    fn append(&mut self, records: &[StoreRecord]) -> Result<(), StoreError> {
        self.records.lock().extend_from_slice(records);
        Ok(())
    }

    fn compact(&mut self, records: &[StoreRecord]) -> Result<(), StoreError> {
        *self.records.lock() = records.to_vec();
        Ok(())
    }
}
