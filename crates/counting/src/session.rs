use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_core::{
    Aggregate, AggregateRoot, CompanyId, DomainError, Event, ItemId, LocationId, OperatorId,
    Quantity, ScanRecordId, SessionId,
};

/// Role of a counting pass.
///
/// Closed variant set replacing the loosely-typed integer count type of the
/// legacy system. `FinalAdjustment` is authoritative over all counting roles;
/// `ErpRecount` is the presence-gated audit session of an ERP discrepancy
/// recount and never participates in consolidation directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountRole {
    FirstCount,
    SecondCount,
    Recount,
    FinalAdjustment,
    ErpRecount,
}

impl CountRole {
    /// Roles with additive scan semantics (scans sum on read).
    ///
    /// ErpRecount is the exception: one deliberate authoritative observation
    /// per item, recorded as an overwrite.
    pub fn is_additive(self) -> bool {
        !matches!(self, CountRole::ErpRecount)
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Finalized,
}

/// One scan row: item + quantity, append-only.
///
/// The same item may appear in any number of records within a session; totals
/// are summed on read. Keeping rows separate lets one erroneous scan be
/// deleted without touching the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub record_id: ScanRecordId,
    pub item_id: ItemId,
    pub quantity: Quantity,
}

/// Aggregate root: CountSession.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountSession {
    id: SessionId,
    company_id: Option<CompanyId>,
    slot_id: Option<LocationId>,
    role: CountRole,
    operator: Option<OperatorId>,
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    finalized_at: Option<DateTime<Utc>>,
    scans: Vec<ScanRecord>,
    version: u64,
    created: bool,
}

impl CountSession {
    /// Create an empty, not-yet-opened aggregate instance for rehydration.
    pub fn empty(id: SessionId) -> Self {
        Self {
            id,
            company_id: None,
            slot_id: None,
            role: CountRole::FirstCount,
            operator: None,
            state: SessionState::Open,
            started_at: None,
            finalized_at: None,
            scans: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SessionId {
        self.id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn slot_id(&self) -> Option<LocationId> {
        self.slot_id
    }

    pub fn role(&self) -> CountRole {
        self.role
    }

    pub fn operator(&self) -> Option<OperatorId> {
        self.operator
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn scans(&self) -> &[ScanRecord] {
        &self.scans
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Sum of live records per item.
    pub fn totals_by_item(&self) -> BTreeMap<ItemId, Quantity> {
        let mut totals = BTreeMap::new();
        for scan in &self.scans {
            *totals.entry(scan.item_id).or_insert(Quantity::ZERO) += scan.quantity;
        }
        totals
    }
}

impl AggregateRoot for CountSession {
    type Id = SessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenSession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSession {
    pub session_id: SessionId,
    pub company_id: CompanyId,
    pub slot_id: LocationId,
    pub role: CountRole,
    pub operator: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordScan (additive roles only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordScan {
    pub session_id: SessionId,
    pub record_id: ScanRecordId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetQuantity (ErpRecount only; overwrites prior records of the item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetQuantity {
    pub session_id: SessionId,
    pub record_id: ScanRecordId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteScan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteScan {
    pub session_id: SessionId,
    pub record_id: ScanRecordId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FinalizeSession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeSession {
    pub session_id: SessionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountingCommand {
    OpenSession(OpenSession),
    RecordScan(RecordScan),
    SetQuantity(SetQuantity),
    DeleteScan(DeleteScan),
    FinalizeSession(FinalizeSession),
}

/// Event: SessionOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOpened {
    pub session_id: SessionId,
    pub company_id: CompanyId,
    pub slot_id: LocationId,
    pub role: CountRole,
    pub operator: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ScanRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecorded {
    pub session_id: SessionId,
    pub record_id: ScanRecordId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuantitySet (ErpRecount overwrite).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantitySet {
    pub session_id: SessionId,
    pub record_id: ScanRecordId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ScanDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDeleted {
    pub session_id: SessionId,
    pub record_id: ScanRecordId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SessionFinalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFinalized {
    pub session_id: SessionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountingEvent {
    SessionOpened(SessionOpened),
    ScanRecorded(ScanRecorded),
    QuantitySet(QuantitySet),
    ScanDeleted(ScanDeleted),
    SessionFinalized(SessionFinalized),
}

impl Event for CountingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CountingEvent::SessionOpened(_) => "counting.session.opened",
            CountingEvent::ScanRecorded(_) => "counting.session.scan_recorded",
            CountingEvent::QuantitySet(_) => "counting.session.quantity_set",
            CountingEvent::ScanDeleted(_) => "counting.session.scan_deleted",
            CountingEvent::SessionFinalized(_) => "counting.session.finalized",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CountingEvent::SessionOpened(e) => e.occurred_at,
            CountingEvent::ScanRecorded(e) => e.occurred_at,
            CountingEvent::QuantitySet(e) => e.occurred_at,
            CountingEvent::ScanDeleted(e) => e.occurred_at,
            CountingEvent::SessionFinalized(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CountSession {
    type Command = CountingCommand;
    type Event = CountingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CountingEvent::SessionOpened(e) => {
                self.id = e.session_id;
                self.company_id = Some(e.company_id);
                self.slot_id = Some(e.slot_id);
                self.role = e.role;
                self.operator = Some(e.operator);
                self.state = SessionState::Open;
                self.started_at = Some(e.occurred_at);
                self.finalized_at = None;
                self.scans.clear();
                self.created = true;
            }
            CountingEvent::ScanRecorded(e) => {
                self.scans.push(ScanRecord {
                    record_id: e.record_id,
                    item_id: e.item_id,
                    quantity: e.quantity,
                });
            }
            CountingEvent::QuantitySet(e) => {
                // Set semantics: one authoritative record per item.
                self.scans.retain(|s| s.item_id != e.item_id);
                self.scans.push(ScanRecord {
                    record_id: e.record_id,
                    item_id: e.item_id,
                    quantity: e.quantity,
                });
            }
            CountingEvent::ScanDeleted(e) => {
                self.scans.retain(|s| s.record_id != e.record_id);
            }
            CountingEvent::SessionFinalized(e) => {
                self.state = SessionState::Finalized;
                self.finalized_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CountingCommand::OpenSession(cmd) => self.handle_open(cmd),
            CountingCommand::RecordScan(cmd) => self.handle_record_scan(cmd),
            CountingCommand::SetQuantity(cmd) => self.handle_set_quantity(cmd),
            CountingCommand::DeleteScan(cmd) => self.handle_delete_scan(cmd),
            CountingCommand::FinalizeSession(cmd) => self.handle_finalize(cmd),
        }
    }
}

impl CountSession {
    fn ensure_session_id(&self, session_id: SessionId) -> Result<(), DomainError> {
        if self.id != session_id {
            return Err(DomainError::invariant("session_id mismatch"));
        }
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.state == SessionState::Finalized {
            return Err(DomainError::SessionClosed);
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenSession) -> Result<Vec<CountingEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("session already exists"));
        }

        Ok(vec![CountingEvent::SessionOpened(SessionOpened {
            session_id: cmd.session_id,
            company_id: cmd.company_id,
            slot_id: cmd.slot_id,
            role: cmd.role,
            operator: cmd.operator,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_scan(&self, cmd: &RecordScan) -> Result<Vec<CountingEvent>, DomainError> {
        self.ensure_mutable()?;
        self.ensure_session_id(cmd.session_id)?;

        if !self.role.is_additive() {
            return Err(DomainError::invariant(
                "recount sessions record overwrites, not additive scans",
            ));
        }
        if cmd.quantity.is_negative() {
            return Err(DomainError::validation("scan quantity cannot be negative"));
        }

        Ok(vec![CountingEvent::ScanRecorded(ScanRecorded {
            session_id: cmd.session_id,
            record_id: cmd.record_id,
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_quantity(&self, cmd: &SetQuantity) -> Result<Vec<CountingEvent>, DomainError> {
        self.ensure_mutable()?;
        self.ensure_session_id(cmd.session_id)?;

        if self.role.is_additive() {
            return Err(DomainError::invariant(
                "only recount sessions record overwrites",
            ));
        }
        if cmd.quantity.is_negative() {
            return Err(DomainError::validation(
                "recount quantity cannot be negative",
            ));
        }

        Ok(vec![CountingEvent::QuantitySet(QuantitySet {
            session_id: cmd.session_id,
            record_id: cmd.record_id,
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete_scan(&self, cmd: &DeleteScan) -> Result<Vec<CountingEvent>, DomainError> {
        self.ensure_mutable()?;
        self.ensure_session_id(cmd.session_id)?;

        if !self.scans.iter().any(|s| s.record_id == cmd.record_id) {
            return Err(DomainError::not_found());
        }

        Ok(vec![CountingEvent::ScanDeleted(ScanDeleted {
            session_id: cmd.session_id,
            record_id: cmd.record_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finalize(&self, cmd: &FinalizeSession) -> Result<Vec<CountingEvent>, DomainError> {
        self.ensure_mutable()?;
        self.ensure_session_id(cmd.session_id)?;

        Ok(vec![CountingEvent::SessionFinalized(SessionFinalized {
            session_id: cmd.session_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
