use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use stocktake_core::{
    Aggregate, AggregateRoot, BatchId, CompanyId, DomainError, DomainResult, ExpectedVersion,
    ItemId, LocationId, OperatorId, Quantity, SessionId,
};
use stocktake_counting::{CountRole, CountSession};
use stocktake_locations::Warehouse;
use stocktake_reconciliation::{
    ApproveSlot, AssignSlot, CreateBatch, FinalizeSlotRecount, RecordRecount, RecountBatch,
    RecountBatchCommand, RecountSeed, RejectSlot, StockComparison,
};

use crate::catalog::CatalogResolver;
use crate::erp::ErpComparisonRunner;
use crate::stores::{BatchStore, SessionStore, WarehouseStore};

use super::{SessionManager, build_final_adjustment, dispatch, require_company};

/// Result of batch generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedBatch {
    pub batch_id: BatchId,
    /// Selected codes that could not be attached to any slot. Reported,
    /// never silently dropped.
    pub unlocated: Vec<String>,
}

/// Resolved physical stock of one item code across the warehouse.
struct CodePhysical {
    item_id: ItemId,
    total: Quantity,
    slots: Vec<(LocationId, Quantity)>,
}

/// The ERP diff-and-recount workflow.
pub struct ReconciliationService {
    warehouses: Arc<dyn WarehouseStore>,
    sessions: Arc<dyn SessionStore>,
    batches: Arc<dyn BatchStore>,
    catalog: Arc<dyn CatalogResolver>,
    runner: ErpComparisonRunner,
    session_manager: SessionManager,
}

impl ReconciliationService {
    pub fn new(
        warehouses: Arc<dyn WarehouseStore>,
        sessions: Arc<dyn SessionStore>,
        batches: Arc<dyn BatchStore>,
        catalog: Arc<dyn CatalogResolver>,
        runner: ErpComparisonRunner,
    ) -> Self {
        let session_manager = SessionManager::new(
            Arc::clone(&warehouses),
            Arc::clone(&sessions),
            Arc::clone(&catalog),
        );
        Self {
            warehouses,
            sessions,
            batches,
            catalog,
            runner,
            session_manager,
        }
    }

    /// Compare the warehouse's resolved physical stock against the ERP.
    pub async fn compare_against_erp(
        &self,
        warehouse_id: LocationId,
    ) -> DomainResult<Vec<StockComparison>> {
        let warehouse = self.warehouses.get(warehouse_id)?;
        let company_id = require_company(&warehouse)?;
        let physical = self.resolved_physical(&warehouse, company_id)?;

        let requests: Vec<(String, Quantity)> = physical
            .iter()
            .map(|(code, p)| (code.clone(), p.total))
            .collect();
        Ok(self
            .runner
            .compare(requests, company_id, warehouse.external_warehouse_id())
            .await)
    }

    /// Generate a recount batch for the selected item codes.
    ///
    /// An item may live in several slots; the discrepancy attaches to each
    /// owning slot, with the ERP quantity taken at code level. Codes without
    /// a catalog entry or without any owning slot come back as unlocated.
    pub async fn generate_batch(
        &self,
        warehouse_id: LocationId,
        name: &str,
        item_codes: &[String],
    ) -> DomainResult<GeneratedBatch> {
        let warehouse = self.warehouses.get(warehouse_id)?;
        let company_id = require_company(&warehouse)?;
        let physical = self.resolved_physical(&warehouse, company_id)?;

        let mut unlocated = Vec::new();
        let mut located: Vec<(&String, &CodePhysical)> = Vec::new();
        for code in item_codes {
            match physical.get(code) {
                Some(p) if !p.slots.is_empty() => located.push((code, p)),
                _ => unlocated.push(code.clone()),
            }
        }

        let requests: Vec<(String, Quantity)> = located
            .iter()
            .map(|(code, p)| ((*code).clone(), p.total))
            .collect();
        let comparisons = self
            .runner
            .compare(requests, company_id, warehouse.external_warehouse_id())
            .await;
        let erp_by_code: BTreeMap<&str, Quantity> = comparisons
            .iter()
            .map(|c| (c.item_code.as_str(), c.erp_qty))
            .collect();

        let mut seeds = Vec::new();
        for (code, p) in &located {
            let erp_qty = erp_by_code
                .get(code.as_str())
                .copied()
                .unwrap_or(Quantity::ZERO);
            for (slot_id, quantity) in &p.slots {
                seeds.push(RecountSeed {
                    slot_id: *slot_id,
                    item_id: p.item_id,
                    item_code: (*code).clone(),
                    physical_qty: *quantity,
                    erp_qty,
                });
            }
        }

        let batch_id = BatchId::new();
        let mut batch = RecountBatch::empty(batch_id);
        dispatch(
            &mut batch,
            &RecountBatchCommand::CreateBatch(CreateBatch {
                batch_id,
                company_id,
                name: name.to_string(),
                items: seeds,
                occurred_at: Utc::now(),
            }),
        )?;
        self.batches.insert(batch)?;
        tracing::info!(batch_id = %batch_id, unlocated = unlocated.len(), "recount batch generated");
        Ok(GeneratedBatch {
            batch_id,
            unlocated,
        })
    }

    pub fn assign_slot(
        &self,
        batch_id: BatchId,
        slot_id: LocationId,
        assignee: OperatorId,
    ) -> DomainResult<()> {
        self.mutate_batch(
            batch_id,
            RecountBatchCommand::AssignSlot(AssignSlot {
                batch_id,
                slot_id,
                assignee,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Open (or resume) the presence-gated audit session of a slot recount.
    pub fn start_recount(
        &self,
        batch_id: BatchId,
        warehouse_id: LocationId,
        slot_id: LocationId,
        operator: OperatorId,
        presence_key: &str,
    ) -> DomainResult<CountSession> {
        let batch = self.batches.get(batch_id)?;
        if batch.items_for_slot(slot_id).is_empty() {
            return Err(DomainError::not_found());
        }
        self.session_manager.start_session(
            warehouse_id,
            slot_id,
            CountRole::ErpRecount,
            operator,
            presence_key,
        )
    }

    /// Record one recounted quantity, on the batch item and the audit session.
    pub fn record_recount(
        &self,
        batch_id: BatchId,
        slot_id: LocationId,
        item_code: &str,
        quantity: Quantity,
        session_id: SessionId,
    ) -> DomainResult<()> {
        let mut batch = self.batches.get(batch_id)?;
        let company_id = batch
            .company_id()
            .ok_or_else(|| DomainError::invariant("batch has no company"))?;
        let item = self
            .catalog
            .resolve_code(item_code, company_id)?
            .ok_or_else(|| DomainError::item_not_found(item_code))?;

        let expected = ExpectedVersion::Exact(batch.version());
        let command = RecountBatchCommand::RecordRecount(RecordRecount {
            batch_id,
            slot_id,
            item_id: item.item_id,
            quantity,
            occurred_at: Utc::now(),
        });
        // The batch drives the workflow, so it is persisted first; a stale
        // batch write leaves the audit session untouched.
        dispatch(&mut batch, &command)?;
        self.batches.update(batch, expected)?;
        self.session_manager
            .set_recount_quantity(session_id, item_code, quantity)?;
        Ok(())
    }

    pub fn finalize_slot_recount(
        &self,
        batch_id: BatchId,
        slot_id: LocationId,
    ) -> DomainResult<()> {
        self.mutate_batch(
            batch_id,
            RecountBatchCommand::FinalizeSlotRecount(FinalizeSlotRecount {
                batch_id,
                slot_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Approve one finalized slot recount.
    ///
    /// Commits per slot, all-or-none: the recorded quantities are injected as
    /// one Finalized FinalAdjustment session, then the batch transition is
    /// persisted. A failed batch persist removes the injected session again,
    /// so no partial approval is ever observable.
    pub fn approve_slot(
        &self,
        batch_id: BatchId,
        warehouse_id: LocationId,
        slot_id: LocationId,
        approved_by: OperatorId,
    ) -> DomainResult<()> {
        let mut batch = self.batches.get(batch_id)?;
        let expected = ExpectedVersion::Exact(batch.version());
        let command = RecountBatchCommand::ApproveSlot(ApproveSlot {
            batch_id,
            slot_id,
            approved_by,
            occurred_at: Utc::now(),
        });
        let events = batch.handle(&command)?;

        let warehouse = self.warehouses.get(warehouse_id)?;
        let quantities: BTreeMap<ItemId, Quantity> =
            batch.recorded_quantities(slot_id).into_iter().collect();
        let adjustment = build_final_adjustment(
            require_company(&warehouse)?,
            slot_id,
            approved_by,
            &quantities,
        )?;
        let adjustment_id = adjustment.id_typed();
        self.sessions.insert(adjustment)?;

        for event in &events {
            batch.apply(event);
        }
        if let Err(err) = self.batches.update(batch, expected) {
            // Compensation: the adjustment must not outlive a failed approval.
            if let Err(remove_err) = self.sessions.remove(adjustment_id) {
                tracing::error!(
                    session_id = %adjustment_id,
                    error = %remove_err,
                    "failed to remove compensating adjustment session"
                );
            }
            return Err(err.into());
        }
        tracing::info!(batch_id = %batch_id, slot_id = %slot_id, "slot recount approved");
        Ok(())
    }

    /// Reject one finalized slot recount. Consolidated quantities stay as
    /// they were; only the reason is recorded on the batch.
    pub fn reject_slot(
        &self,
        batch_id: BatchId,
        slot_id: LocationId,
        rejected_by: OperatorId,
        reason: &str,
    ) -> DomainResult<()> {
        self.mutate_batch(
            batch_id,
            RecountBatchCommand::RejectSlot(RejectSlot {
                batch_id,
                slot_id,
                rejected_by,
                reason: reason.to_string(),
                occurred_at: Utc::now(),
            }),
        )
    }

    fn mutate_batch(&self, batch_id: BatchId, command: RecountBatchCommand) -> DomainResult<()> {
        let mut batch = self.batches.get(batch_id)?;
        let expected = ExpectedVersion::Exact(batch.version());
        dispatch(&mut batch, &command)?;
        self.batches.update(batch, expected)?;
        Ok(())
    }

    /// Resolved physical quantity per item code, with the owning slots.
    fn resolved_physical(
        &self,
        warehouse: &Warehouse,
        company_id: CompanyId,
    ) -> DomainResult<BTreeMap<String, CodePhysical>> {
        let mut by_code: BTreeMap<String, CodePhysical> = BTreeMap::new();
        for slot in warehouse.slots() {
            let sessions = self.sessions.list_for_slot(slot.id)?;
            let consolidation = stocktake_consolidation::consolidate_slot(slot.id, &sessions);
            for (item_id, quantity) in consolidation.resolved_quantities() {
                let Some(item) = self.catalog.find_by_id(item_id, company_id)? else {
                    tracing::warn!(item_id = %item_id, "item missing from catalog, excluded from comparison");
                    continue;
                };
                let entry = by_code.entry(item.code).or_insert_with(|| CodePhysical {
                    item_id,
                    total: Quantity::ZERO,
                    slots: Vec::new(),
                });
                entry.total += quantity;
                entry.slots.push((slot.id, quantity));
            }
        }
        Ok(by_code)
    }
}
