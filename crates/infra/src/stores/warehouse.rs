use std::collections::HashMap;
use std::sync::RwLock;

use stocktake_core::{AggregateRoot, CompanyId, ExpectedVersion, LocationId};
use stocktake_locations::Warehouse;

use super::StoreError;

pub trait WarehouseStore: Send + Sync {
    fn insert(&self, warehouse: Warehouse) -> Result<(), StoreError>;
    fn update(&self, warehouse: Warehouse, expected: ExpectedVersion) -> Result<(), StoreError>;
    fn get(&self, warehouse_id: LocationId) -> Result<Warehouse, StoreError>;
    fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<Warehouse>, StoreError>;
}

/// In-memory warehouse store. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryWarehouseStore {
    inner: RwLock<HashMap<LocationId, Warehouse>>,
}

impl InMemoryWarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WarehouseStore for InMemoryWarehouseStore {
    fn insert(&self, warehouse: Warehouse) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let id = warehouse.id_typed();
        if inner.contains_key(&id) {
            return Err(StoreError::Concurrency(format!(
                "warehouse {id} already exists"
            )));
        }
        inner.insert(id, warehouse);
        Ok(())
    }

    fn update(&self, warehouse: Warehouse, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let id = warehouse.id_typed();
        let current = inner.get(&id).ok_or(StoreError::NotFound)?;
        if !expected.matches(current.version()) {
            return Err(StoreError::Concurrency(format!(
                "warehouse {id}: expected {expected:?}, found {}",
                current.version()
            )));
        }
        inner.insert(id, warehouse);
        Ok(())
    }

    fn get(&self, warehouse_id: LocationId) -> Result<Warehouse, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::poisoned())?;
        inner
            .get(&warehouse_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<Warehouse>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(inner
            .values()
            .filter(|w| w.company_id() == Some(company_id))
            .cloned()
            .collect())
    }
}
