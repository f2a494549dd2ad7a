//! In-process store
//!
//! Keeps the document as serialized JSON so loads go through the same
//! decoding path as the database backend.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::aggregate::Economy;

use super::{AggregateStore, StoreError};

#[derive(Debug)]
struct StoredDocument {
    version: i64,
    document: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct MemoryAggregateStore {
    slot: Mutex<Option<StoredDocument>>,
    writes: AtomicU64,
}

impl MemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing raw document, e.g. one imported from another
    /// deployment
    pub fn with_document(document: serde_json::Value) -> Self {
        Self {
            slot: Mutex::new(Some(StoredDocument { version: 1, document })),
            writes: AtomicU64::new(0),
        }
    }

    /// Successful saves so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn load_now(&self) -> Result<Economy, StoreError> {
        let (version, document) = match self.slot.lock().as_ref() {
            Some(stored) => (stored.version, stored.document.clone()),
            None => return Ok(Economy::default()),
        };
        let mut economy: Economy = serde_json::from_value(document)?;
        economy.set_version(version);
        Ok(economy)
    }

    pub fn save_now(&self, economy: &Economy) -> Result<i64, StoreError> {
        let document = serde_json::to_value(economy)?;
        let mut slot = self.slot.lock();

        let actual = slot.as_ref().map_or(0, |stored| stored.version);
        if actual != economy.version() {
            return Err(StoreError::ConcurrencyConflict {
                expected: economy.version(),
                actual,
            });
        }

        let version = actual + 1;
        *slot = Some(StoredDocument { version, document });
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(version)
    }
}

#[async_trait]
impl AggregateStore for MemoryAggregateStore {
    async fn load(&self) -> Result<Economy, StoreError> {
        self.load_now()
    }

    async fn save(&self, economy: &Economy) -> Result<i64, StoreError> {
        self.save_now(economy)
    }
}
