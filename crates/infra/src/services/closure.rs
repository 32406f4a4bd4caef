use std::sync::Arc;

use chrono::Utc;

use stocktake_core::{AggregateRoot, DomainResult, ExpectedVersion, LocationId, Operator};
use stocktake_locations::{CloseAisle, CloseWarehouse, CloseZone, WarehouseCommand};

use crate::stores::WarehouseStore;

use super::dispatch;

/// Executes closure transitions on the warehouse tree.
///
/// Preconditions (children closed first) live in the aggregate; this service
/// only loads, dispatches and persists with optimistic concurrency. The
/// acting principal is recorded on the closure event.
pub struct ClosureService {
    warehouses: Arc<dyn WarehouseStore>,
}

impl ClosureService {
    pub fn new(warehouses: Arc<dyn WarehouseStore>) -> Self {
        Self { warehouses }
    }

    pub fn close_aisle(
        &self,
        warehouse_id: LocationId,
        aisle_id: LocationId,
        operator: &Operator,
    ) -> DomainResult<()> {
        self.close(
            warehouse_id,
            WarehouseCommand::CloseAisle(CloseAisle {
                warehouse_id,
                aisle_id,
                closed_by: operator.id,
                occurred_at: Utc::now(),
            }),
            operator,
        )
    }

    pub fn close_zone(
        &self,
        warehouse_id: LocationId,
        zone_id: LocationId,
        operator: &Operator,
    ) -> DomainResult<()> {
        self.close(
            warehouse_id,
            WarehouseCommand::CloseZone(CloseZone {
                warehouse_id,
                zone_id,
                closed_by: operator.id,
                occurred_at: Utc::now(),
            }),
            operator,
        )
    }

    pub fn close_warehouse(
        &self,
        warehouse_id: LocationId,
        operator: &Operator,
    ) -> DomainResult<()> {
        self.close(
            warehouse_id,
            WarehouseCommand::CloseWarehouse(CloseWarehouse {
                warehouse_id,
                closed_by: operator.id,
                occurred_at: Utc::now(),
            }),
            operator,
        )
    }

    fn close(
        &self,
        warehouse_id: LocationId,
        command: WarehouseCommand,
        operator: &Operator,
    ) -> DomainResult<()> {
        let mut warehouse = self.warehouses.get(warehouse_id)?;
        let expected = ExpectedVersion::Exact(warehouse.version());
        dispatch(&mut warehouse, &command)?;
        self.warehouses.update(warehouse, expected)?;
        tracing::info!(
            warehouse_id = %warehouse_id,
            closed_by = %operator.display_name,
            "closure applied"
        );
        Ok(())
    }
}
