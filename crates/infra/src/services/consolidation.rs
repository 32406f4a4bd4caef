use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use stocktake_core::{DomainResult, ItemId, LocationId, OperatorId, SessionId};
use stocktake_consolidation::{
    ConflictChoice, SlotConsolidation, apply_conflict_choices, sum_for_export,
};
use stocktake_counting::CountRole;

use crate::catalog::CatalogResolver;
use crate::stores::{SessionStore, StoreError, WarehouseStore};

use super::{build_final_adjustment, require_company};

/// Outcome of the explicit auto-save command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveOutcome {
    /// A final adjustment was written.
    Saved,
    /// A final adjustment already existed; nothing was written.
    AlreadyResolved,
    /// Items still in conflict; nothing was written.
    Unresolved(Vec<ItemId>),
}

/// One row of the warehouse-level export, quantity in the fixed
/// 4-decimal rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub item_code: String,
    pub warehouse_code: String,
    pub quantity: String,
}

/// Consolidation reads plus the writes that pin a slot's result down.
pub struct ConsolidationService {
    warehouses: Arc<dyn WarehouseStore>,
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn CatalogResolver>,
    /// Actor recorded on auto-saved adjustments.
    system_operator: OperatorId,
}

impl ConsolidationService {
    pub fn new(
        warehouses: Arc<dyn WarehouseStore>,
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn CatalogResolver>,
        system_operator: OperatorId,
    ) -> Self {
        Self {
            warehouses,
            sessions,
            catalog,
            system_operator,
        }
    }

    /// Recompute the consolidation of one slot from its live records.
    ///
    /// Derived on every read, never stored, so it cannot drift.
    pub fn consolidate_slot(&self, slot_id: LocationId) -> DomainResult<SlotConsolidation> {
        let sessions = self.sessions.list_for_slot(slot_id)?;
        Ok(stocktake_consolidation::consolidate_slot(
            slot_id, &sessions,
        ))
    }

    /// Write a final adjustment iff the slot is fully resolved.
    ///
    /// Idempotent: a repeat call, or a concurrent call that loses the insert,
    /// reports `AlreadyResolved` rather than erroring or double-writing.
    pub fn auto_save_if_resolved(
        &self,
        warehouse_id: LocationId,
        slot_id: LocationId,
    ) -> DomainResult<AutoSaveOutcome> {
        let sessions = self.sessions.list_for_slot(slot_id)?;
        if sessions
            .iter()
            .any(|s| s.role() == CountRole::FinalAdjustment)
        {
            return Ok(AutoSaveOutcome::AlreadyResolved);
        }

        let consolidation = stocktake_consolidation::consolidate_slot(slot_id, &sessions);
        if !consolidation.is_fully_resolved() {
            return Ok(AutoSaveOutcome::Unresolved(consolidation.conflict_items()));
        }

        let warehouse = self.warehouses.get(warehouse_id)?;
        let adjustment = build_final_adjustment(
            require_company(&warehouse)?,
            slot_id,
            self.system_operator,
            &consolidation.resolved_quantities(),
        )?;
        // Conditional insert: the absence check above is only a fast path,
        // the store re-checks under its write lock so the losing writer of a
        // race lands here instead of double-writing.
        match self.sessions.insert_adjustment_if_absent(slot_id, adjustment) {
            Ok(()) => {
                tracing::info!(slot_id = %slot_id, "consolidation auto-saved");
                Ok(AutoSaveOutcome::Saved)
            }
            Err(StoreError::Concurrency(_)) => Ok(AutoSaveOutcome::AlreadyResolved),
            Err(other) => Err(other.into()),
        }
    }

    /// Persist a manual resolution of a conflicted slot.
    ///
    /// Every conflict item must carry a choice; a partial save is rejected
    /// with `IncompleteResolution`.
    pub fn save_resolution(
        &self,
        warehouse_id: LocationId,
        slot_id: LocationId,
        choices: &BTreeMap<ItemId, ConflictChoice>,
        operator: OperatorId,
    ) -> DomainResult<SessionId> {
        let consolidation = self.consolidate_slot(slot_id)?;
        let quantities = apply_conflict_choices(&consolidation, choices)?;

        let warehouse = self.warehouses.get(warehouse_id)?;
        let adjustment = build_final_adjustment(
            require_company(&warehouse)?,
            slot_id,
            operator,
            &quantities,
        )?;
        let session_id = adjustment.id_typed();
        self.sessions.insert(adjustment)?;
        tracing::info!(slot_id = %slot_id, session_id = %session_id, "resolution saved");
        Ok(session_id)
    }

    /// Warehouse-level export: resolved quantities summed per item code.
    ///
    /// Slots still in conflict contribute nothing. Items the catalog cannot
    /// resolve are skipped with a warning rather than failing the export.
    pub fn export_consolidated(&self, warehouse_id: LocationId) -> DomainResult<Vec<ExportRow>> {
        let warehouse = self.warehouses.get(warehouse_id)?;
        let company_id = require_company(&warehouse)?;

        let mut consolidated: Vec<(SlotConsolidation, BTreeMap<ItemId, String>)> = Vec::new();
        for slot in warehouse.slots() {
            let consolidation = self.consolidate_slot(slot.id)?;
            let mut codes = BTreeMap::new();
            for item_id in consolidation.resolved_quantities().keys() {
                match self.catalog.find_by_id(*item_id, company_id)? {
                    Some(item) => {
                        codes.insert(*item_id, item.code);
                    }
                    None => {
                        tracing::warn!(item_id = %item_id, "item missing from catalog, skipped in export");
                    }
                }
            }
            consolidated.push((consolidation, codes));
        }

        let lines = sum_for_export(
            warehouse.code(),
            consolidated.iter().map(|(c, codes)| (c, codes)),
        );
        Ok(lines
            .into_iter()
            .map(|line| ExportRow {
                item_code: line.item_code,
                warehouse_code: line.warehouse_code,
                quantity: line.quantity.to_string(),
            })
            .collect())
    }
}
