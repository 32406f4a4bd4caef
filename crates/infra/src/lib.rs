//! `stocktake-infra`: stores, external ports and application services.
//!
//! The domain crates stay pure; everything that touches a lock, a store or an
//! external system lives here. Services load an aggregate, dispatch commands
//! on it and persist the result with optimistic concurrency.

pub mod catalog;
pub mod erp;
pub mod services;
pub mod stores;


pub use catalog::{CachedCatalog, CatalogItem, CatalogResolver, InMemoryCatalog, LookupError};
pub use erp::{ErpComparisonRunner, ErpStockSource, ExternalLookupError, InMemoryErpStockSource};
pub use services::{
    AutoSaveOutcome, ClosureService, ConsolidationService, ExportRow, GeneratedBatch,
    ReconciliationService, SessionManager,
};
pub use stores::{
    BatchStore, InMemoryBatchStore, InMemorySessionStore, InMemoryWarehouseStore, SessionStore,
    StoreError, WarehouseStore,
};
