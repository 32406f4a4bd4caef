use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_core::{
    Aggregate, AggregateRoot, BatchId, CompanyId, DomainError, Event, ItemId, LocationId,
    OperatorId, Quantity,
};

/// Lifecycle of one recount item. Forward-only; Rejected is terminal and
/// carries an audit reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecountItemState {
    Pending,
    Assigned,
    InProgress,
    Finalized,
    Approved,
    Rejected,
}

/// Seed of one recount item at batch generation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecountSeed {
    pub slot_id: LocationId,
    pub item_id: ItemId,
    pub item_code: String,
    pub physical_qty: Quantity,
    pub erp_qty: Quantity,
}

/// One discrepancy to be walked and recounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecountItem {
    pub slot_id: LocationId,
    pub item_id: ItemId,
    pub item_code: String,
    pub physical_qty: Quantity,
    pub erp_qty: Quantity,
    pub diff: Quantity,
    pub recount_qty: Option<Quantity>,
    pub state: RecountItemState,
    pub assignee: Option<OperatorId>,
    pub rejection_reason: Option<String>,
}

/// Aggregate root: RecountBatch (a "lot").
///
/// Assignment, finalization, approval and rejection all operate at slot
/// granularity: every item within one slot moves together, preserving an
/// atomic "walk the aisle" unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecountBatch {
    id: BatchId,
    company_id: Option<CompanyId>,
    name: String,
    items: Vec<RecountItem>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl RecountBatch {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BatchId) -> Self {
        Self {
            id,
            company_id: None,
            name: String::new(),
            items: Vec::new(),
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[RecountItem] {
        &self.items
    }

    pub fn items_for_slot(&self, slot_id: LocationId) -> Vec<&RecountItem> {
        self.items.iter().filter(|i| i.slot_id == slot_id).collect()
    }

    /// Distinct slots of the batch, in generation order.
    pub fn slot_ids(&self) -> Vec<LocationId> {
        let mut slots = Vec::new();
        for item in &self.items {
            if !slots.contains(&item.slot_id) {
                slots.push(item.slot_id);
            }
        }
        slots
    }

    /// Recorded recount quantities of a slot, for the approval injection.
    pub fn recorded_quantities(&self, slot_id: LocationId) -> Vec<(ItemId, Quantity)> {
        self.items
            .iter()
            .filter(|i| i.slot_id == slot_id)
            .filter_map(|i| i.recount_qty.map(|q| (i.item_id, q)))
            .collect()
    }
}

impl AggregateRoot for RecountBatch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatch {
    pub batch_id: BatchId,
    pub company_id: CompanyId,
    pub name: String,
    pub items: Vec<RecountSeed>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignSlot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignSlot {
    pub batch_id: BatchId,
    pub slot_id: LocationId,
    pub assignee: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordRecount (direct overwrite, not additive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRecount {
    pub batch_id: BatchId,
    pub slot_id: LocationId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FinalizeSlotRecount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeSlotRecount {
    pub batch_id: BatchId,
    pub slot_id: LocationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveSlot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveSlot {
    pub batch_id: BatchId,
    pub slot_id: LocationId,
    pub approved_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectSlot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectSlot {
    pub batch_id: BatchId,
    pub slot_id: LocationId,
    pub rejected_by: OperatorId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecountBatchCommand {
    CreateBatch(CreateBatch),
    AssignSlot(AssignSlot),
    RecordRecount(RecordRecount),
    FinalizeSlotRecount(FinalizeSlotRecount),
    ApproveSlot(ApproveSlot),
    RejectSlot(RejectSlot),
}

/// Event: BatchCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreated {
    pub batch_id: BatchId,
    pub company_id: CompanyId,
    pub name: String,
    pub items: Vec<RecountSeed>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAssigned {
    pub batch_id: BatchId,
    pub slot_id: LocationId,
    pub assignee: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecountRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecountRecorded {
    pub batch_id: BatchId,
    pub slot_id: LocationId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotRecountFinalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecountFinalized {
    pub batch_id: BatchId,
    pub slot_id: LocationId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotApproved {
    pub batch_id: BatchId,
    pub slot_id: LocationId,
    pub approved_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRejected {
    pub batch_id: BatchId,
    pub slot_id: LocationId,
    pub rejected_by: OperatorId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecountBatchEvent {
    BatchCreated(BatchCreated),
    SlotAssigned(SlotAssigned),
    RecountRecorded(RecountRecorded),
    SlotRecountFinalized(SlotRecountFinalized),
    SlotApproved(SlotApproved),
    SlotRejected(SlotRejected),
}

impl Event for RecountBatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RecountBatchEvent::BatchCreated(_) => "reconciliation.batch.created",
            RecountBatchEvent::SlotAssigned(_) => "reconciliation.batch.slot_assigned",
            RecountBatchEvent::RecountRecorded(_) => "reconciliation.batch.recount_recorded",
            RecountBatchEvent::SlotRecountFinalized(_) => {
                "reconciliation.batch.slot_recount_finalized"
            }
            RecountBatchEvent::SlotApproved(_) => "reconciliation.batch.slot_approved",
            RecountBatchEvent::SlotRejected(_) => "reconciliation.batch.slot_rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RecountBatchEvent::BatchCreated(e) => e.occurred_at,
            RecountBatchEvent::SlotAssigned(e) => e.occurred_at,
            RecountBatchEvent::RecountRecorded(e) => e.occurred_at,
            RecountBatchEvent::SlotRecountFinalized(e) => e.occurred_at,
            RecountBatchEvent::SlotApproved(e) => e.occurred_at,
            RecountBatchEvent::SlotRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for RecountBatch {
    type Command = RecountBatchCommand;
    type Event = RecountBatchEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RecountBatchEvent::BatchCreated(e) => {
                self.id = e.batch_id;
                self.company_id = Some(e.company_id);
                self.name = e.name.clone();
                self.created_at = Some(e.occurred_at);
                self.items = e
                    .items
                    .iter()
                    .map(|seed| RecountItem {
                        slot_id: seed.slot_id,
                        item_id: seed.item_id,
                        item_code: seed.item_code.clone(),
                        physical_qty: seed.physical_qty,
                        erp_qty: seed.erp_qty,
                        diff: seed.physical_qty - seed.erp_qty,
                        recount_qty: None,
                        state: RecountItemState::Pending,
                        assignee: None,
                        rejection_reason: None,
                    })
                    .collect();
                self.created = true;
            }
            RecountBatchEvent::SlotAssigned(e) => {
                for item in self.items.iter_mut().filter(|i| i.slot_id == e.slot_id) {
                    item.assignee = Some(e.assignee);
                    item.state = RecountItemState::Assigned;
                }
            }
            RecountBatchEvent::RecountRecorded(e) => {
                if let Some(item) = self
                    .items
                    .iter_mut()
                    .find(|i| i.slot_id == e.slot_id && i.item_id == e.item_id)
                {
                    item.recount_qty = Some(e.quantity);
                    item.state = RecountItemState::InProgress;
                }
            }
            RecountBatchEvent::SlotRecountFinalized(e) => {
                for item in self.items.iter_mut().filter(|i| i.slot_id == e.slot_id) {
                    item.state = RecountItemState::Finalized;
                }
            }
            RecountBatchEvent::SlotApproved(e) => {
                for item in self.items.iter_mut().filter(|i| i.slot_id == e.slot_id) {
                    item.state = RecountItemState::Approved;
                }
            }
            RecountBatchEvent::SlotRejected(e) => {
                for item in self.items.iter_mut().filter(|i| i.slot_id == e.slot_id) {
                    item.state = RecountItemState::Rejected;
                    item.rejection_reason = Some(e.reason.clone());
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RecountBatchCommand::CreateBatch(cmd) => self.handle_create(cmd),
            RecountBatchCommand::AssignSlot(cmd) => self.handle_assign(cmd),
            RecountBatchCommand::RecordRecount(cmd) => self.handle_record(cmd),
            RecountBatchCommand::FinalizeSlotRecount(cmd) => self.handle_finalize(cmd),
            RecountBatchCommand::ApproveSlot(cmd) => self.handle_approve(cmd),
            RecountBatchCommand::RejectSlot(cmd) => self.handle_reject(cmd),
        }
    }
}

impl RecountBatch {
    fn ensure_batch_id(&self, batch_id: BatchId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != batch_id {
            return Err(DomainError::invariant("batch_id mismatch"));
        }
        Ok(())
    }

    fn slot_items(&self, slot_id: LocationId) -> Result<Vec<&RecountItem>, DomainError> {
        let items = self.items_for_slot(slot_id);
        if items.is_empty() {
            return Err(DomainError::not_found());
        }
        Ok(items)
    }

    fn handle_create(&self, cmd: &CreateBatch) -> Result<Vec<RecountBatchEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("batch already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("batch name cannot be empty"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("batch must contain at least one item"));
        }

        Ok(vec![RecountBatchEvent::BatchCreated(BatchCreated {
            batch_id: cmd.batch_id,
            company_id: cmd.company_id,
            name: cmd.name.clone(),
            items: cmd.items.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignSlot) -> Result<Vec<RecountBatchEvent>, DomainError> {
        self.ensure_batch_id(cmd.batch_id)?;
        let items = self.slot_items(cmd.slot_id)?;

        // All items of the slot move together; none may have moved on already.
        if items.iter().any(|i| i.state != RecountItemState::Pending) {
            return Err(DomainError::invariant("slot is already assigned"));
        }

        Ok(vec![RecountBatchEvent::SlotAssigned(SlotAssigned {
            batch_id: cmd.batch_id,
            slot_id: cmd.slot_id,
            assignee: cmd.assignee,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record(&self, cmd: &RecordRecount) -> Result<Vec<RecountBatchEvent>, DomainError> {
        self.ensure_batch_id(cmd.batch_id)?;

        let item = self
            .items
            .iter()
            .find(|i| i.slot_id == cmd.slot_id && i.item_id == cmd.item_id)
            .ok_or_else(DomainError::not_found)?;
        if !matches!(
            item.state,
            RecountItemState::Assigned | RecountItemState::InProgress
        ) {
            return Err(DomainError::invariant(format!(
                "item '{}' is not open for recounting",
                item.item_code
            )));
        }
        if cmd.quantity.is_negative() {
            return Err(DomainError::validation(
                "recount quantity cannot be negative",
            ));
        }

        Ok(vec![RecountBatchEvent::RecountRecorded(RecountRecorded {
            batch_id: cmd.batch_id,
            slot_id: cmd.slot_id,
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finalize(
        &self,
        cmd: &FinalizeSlotRecount,
    ) -> Result<Vec<RecountBatchEvent>, DomainError> {
        self.ensure_batch_id(cmd.batch_id)?;
        let items = self.slot_items(cmd.slot_id)?;

        if items
            .iter()
            .any(|i| !matches!(i.state, RecountItemState::Assigned | RecountItemState::InProgress))
        {
            return Err(DomainError::invariant("slot recount is not in progress"));
        }

        let missing: Vec<&str> = items
            .iter()
            .filter(|i| i.recount_qty.is_none())
            .map(|i| i.item_code.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::validation(format!(
                "items without a recorded recount: {}",
                missing.join(", ")
            )));
        }

        Ok(vec![RecountBatchEvent::SlotRecountFinalized(
            SlotRecountFinalized {
                batch_id: cmd.batch_id,
                slot_id: cmd.slot_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_approve(&self, cmd: &ApproveSlot) -> Result<Vec<RecountBatchEvent>, DomainError> {
        self.ensure_batch_id(cmd.batch_id)?;
        let items = self.slot_items(cmd.slot_id)?;

        if items.iter().any(|i| i.state != RecountItemState::Finalized) {
            return Err(DomainError::invariant(
                "only a finalized slot recount can be approved",
            ));
        }

        Ok(vec![RecountBatchEvent::SlotApproved(SlotApproved {
            batch_id: cmd.batch_id,
            slot_id: cmd.slot_id,
            approved_by: cmd.approved_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectSlot) -> Result<Vec<RecountBatchEvent>, DomainError> {
        self.ensure_batch_id(cmd.batch_id)?;
        let items = self.slot_items(cmd.slot_id)?;

        if items.iter().any(|i| i.state != RecountItemState::Finalized) {
            return Err(DomainError::invariant(
                "only a finalized slot recount can be rejected",
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("rejection reason cannot be empty"));
        }

        Ok(vec![RecountBatchEvent::SlotRejected(SlotRejected {
            batch_id: cmd.batch_id,
            slot_id: cmd.slot_id,
            rejected_by: cmd.rejected_by,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
