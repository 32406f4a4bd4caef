use std::collections::HashMap;
use std::sync::RwLock;

use stocktake_core::{AggregateRoot, BatchId, ExpectedVersion};
use stocktake_reconciliation::RecountBatch;

use super::StoreError;

pub trait BatchStore: Send + Sync {
    fn insert(&self, batch: RecountBatch) -> Result<(), StoreError>;
    fn update(&self, batch: RecountBatch, expected: ExpectedVersion) -> Result<(), StoreError>;
    fn get(&self, batch_id: BatchId) -> Result<RecountBatch, StoreError>;
}

/// In-memory recount batch store. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    inner: RwLock<HashMap<BatchId, RecountBatch>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchStore for InMemoryBatchStore {
    fn insert(&self, batch: RecountBatch) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let id = batch.id_typed();
        if inner.contains_key(&id) {
            return Err(StoreError::Concurrency(format!("batch {id} already exists")));
        }
        inner.insert(id, batch);
        Ok(())
    }

    fn update(&self, batch: RecountBatch, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let id = batch.id_typed();
        let current = inner.get(&id).ok_or(StoreError::NotFound)?;
        if !expected.matches(current.version()) {
            return Err(StoreError::Concurrency(format!(
                "batch {id}: expected {expected:?}, found {}",
                current.version()
            )));
        }
        inner.insert(id, batch);
        Ok(())
    }

    fn get(&self, batch_id: BatchId) -> Result<RecountBatch, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::poisoned())?;
        inner.get(&batch_id).cloned().ok_or(StoreError::NotFound)
    }
}
