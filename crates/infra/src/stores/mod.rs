//! Persistence boundary: store traits plus in-memory implementations.
//!
//! No schema is prescribed; the in-memory stores keep whole aggregate
//! snapshots behind an `RwLock` and enforce the same optimistic concurrency
//! contract a database-backed implementation would.

mod batch;
mod session;
mod warehouse;

pub use batch::{BatchStore, InMemoryBatchStore};
pub use session::{InMemorySessionStore, SessionStore};
pub use warehouse::{InMemoryWarehouseStore, WarehouseStore};

use thiserror::Error;

use stocktake_core::DomainError;

/// Storage-layer error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    /// An optimistic write lost, or an insert hit an existing key.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("store failure: {0}")]
    Internal(String),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        Self::Internal("lock poisoned".to_string())
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => DomainError::NotFound,
            StoreError::Concurrency(msg) => DomainError::stale_write(msg),
            StoreError::Internal(msg) => DomainError::invariant(msg),
        }
    }
}
