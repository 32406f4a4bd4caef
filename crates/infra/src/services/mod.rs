//! Application services wiring aggregates, stores and external ports.

mod closure;
mod consolidation;
mod reconciliation;
mod session_manager;

pub use closure::ClosureService;
pub use consolidation::{AutoSaveOutcome, ConsolidationService, ExportRow};
pub use reconciliation::{GeneratedBatch, ReconciliationService};
pub use session_manager::SessionManager;

use std::collections::BTreeMap;

use chrono::Utc;

use stocktake_core::{
    Aggregate, CompanyId, DomainError, DomainResult, ItemId, LocationId, OperatorId, Quantity,
    ScanRecordId, SessionId,
};
use stocktake_counting::{
    CountRole, CountSession, CountingCommand, FinalizeSession, OpenSession, RecordScan,
};
use stocktake_locations::Warehouse;

/// Run a command against an aggregate and fold the emitted events back in.
pub(crate) fn dispatch<A: Aggregate>(
    aggregate: &mut A,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error> {
    let events = aggregate.handle(command)?;
    for event in &events {
        aggregate.apply(event);
    }
    Ok(events)
}

pub(crate) fn require_company(warehouse: &Warehouse) -> DomainResult<CompanyId> {
    warehouse
        .company_id()
        .ok_or_else(|| DomainError::invariant("warehouse has no company"))
}

/// Build a Finalized FinalAdjustment session carrying the given quantities.
///
/// Shared by the auto-save path, manual conflict resolution and the approval
/// of an ERP recount. The adjustment is born finalized: it is a recorded
/// decision, not a session anyone keeps scanning into.
pub(crate) fn build_final_adjustment(
    company_id: CompanyId,
    slot_id: LocationId,
    operator: OperatorId,
    quantities: &BTreeMap<ItemId, Quantity>,
) -> DomainResult<CountSession> {
    let session_id = SessionId::new();
    let mut session = CountSession::empty(session_id);
    let now = Utc::now();

    dispatch(
        &mut session,
        &CountingCommand::OpenSession(OpenSession {
            session_id,
            company_id,
            slot_id,
            role: CountRole::FinalAdjustment,
            operator,
            occurred_at: now,
        }),
    )?;
    for (item_id, quantity) in quantities {
        dispatch(
            &mut session,
            &CountingCommand::RecordScan(RecordScan {
                session_id,
                record_id: ScanRecordId::new(),
                item_id: *item_id,
                quantity: *quantity,
                occurred_at: now,
            }),
        )?;
    }
    dispatch(
        &mut session,
        &CountingCommand::FinalizeSession(FinalizeSession {
            session_id,
            occurred_at: now,
        }),
    )?;

    Ok(session)
}
