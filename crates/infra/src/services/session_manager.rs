use std::sync::Arc;

use chrono::Utc;

use stocktake_core::{
    AggregateRoot, DomainError, DomainResult, ExpectedVersion, LocationId, OperatorId, Quantity,
    ScanRecordId, SessionId,
};
use stocktake_counting::{
    CountRole, CountSession, CountingCommand, DeleteScan, FinalizeSession, OpenSession, RecordScan,
    SetQuantity,
};

use crate::catalog::{CatalogItem, CatalogResolver};
use crate::stores::{SessionStore, WarehouseStore};

use super::dispatch;

/// Opens, resumes and mutates count sessions.
///
/// Every opening is presence-gated: the operator proves they are standing at
/// the slot by presenting its presence key.
pub struct SessionManager {
    warehouses: Arc<dyn WarehouseStore>,
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn CatalogResolver>,
}

impl SessionManager {
    pub fn new(
        warehouses: Arc<dyn WarehouseStore>,
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn CatalogResolver>,
    ) -> Self {
        Self {
            warehouses,
            sessions,
            catalog,
        }
    }

    /// Presence-gated open-or-resume.
    ///
    /// When an open session already exists for (slot, role, operator) it is
    /// returned unchanged, so a crashed device resumes instead of forking a
    /// second session.
    pub fn start_session(
        &self,
        warehouse_id: LocationId,
        slot_id: LocationId,
        role: CountRole,
        operator: OperatorId,
        presence_key: &str,
    ) -> DomainResult<CountSession> {
        let warehouse = self.warehouses.get(warehouse_id)?;
        warehouse.verify_presence(slot_id, presence_key)?;

        if let Some(existing) = self.sessions.find_open(slot_id, role, operator)? {
            tracing::debug!(session_id = %existing.id_typed(), "resuming open session");
            return Ok(existing);
        }

        let company_id = super::require_company(&warehouse)?;
        let session_id = SessionId::new();
        let mut session = CountSession::empty(session_id);
        dispatch(
            &mut session,
            &CountingCommand::OpenSession(OpenSession {
                session_id,
                company_id,
                slot_id,
                role,
                operator,
                occurred_at: Utc::now(),
            }),
        )?;
        self.sessions.insert(session.clone())?;
        tracing::info!(session_id = %session_id, slot_id = %slot_id, ?role, "session opened");
        Ok(session)
    }

    /// Record one additive scan, resolving the item code against the catalog.
    pub fn record_scan(
        &self,
        session_id: SessionId,
        item_code: &str,
        quantity: Quantity,
    ) -> DomainResult<ScanRecordId> {
        let mut session = self.sessions.get(session_id)?;
        let item = self.resolve_item(&session, item_code)?;
        let expected = ExpectedVersion::Exact(session.version());
        let record_id = ScanRecordId::new();
        dispatch(
            &mut session,
            &CountingCommand::RecordScan(RecordScan {
                session_id,
                record_id,
                item_id: item.item_id,
                quantity,
                occurred_at: Utc::now(),
            }),
        )?;
        self.sessions.update(session, expected)?;
        Ok(record_id)
    }

    /// Overwrite the quantity of an item in an ErpRecount session.
    pub fn set_recount_quantity(
        &self,
        session_id: SessionId,
        item_code: &str,
        quantity: Quantity,
    ) -> DomainResult<ScanRecordId> {
        let mut session = self.sessions.get(session_id)?;
        let item = self.resolve_item(&session, item_code)?;
        let expected = ExpectedVersion::Exact(session.version());
        let record_id = ScanRecordId::new();
        dispatch(
            &mut session,
            &CountingCommand::SetQuantity(SetQuantity {
                session_id,
                record_id,
                item_id: item.item_id,
                quantity,
                occurred_at: Utc::now(),
            }),
        )?;
        self.sessions.update(session, expected)?;
        Ok(record_id)
    }

    pub fn delete_scan(&self, session_id: SessionId, record_id: ScanRecordId) -> DomainResult<()> {
        let mut session = self.sessions.get(session_id)?;
        let expected = ExpectedVersion::Exact(session.version());
        dispatch(
            &mut session,
            &CountingCommand::DeleteScan(DeleteScan {
                session_id,
                record_id,
                occurred_at: Utc::now(),
            }),
        )?;
        self.sessions.update(session, expected)?;
        Ok(())
    }

    pub fn finalize_session(&self, session_id: SessionId) -> DomainResult<CountSession> {
        let mut session = self.sessions.get(session_id)?;
        let expected = ExpectedVersion::Exact(session.version());
        dispatch(
            &mut session,
            &CountingCommand::FinalizeSession(FinalizeSession {
                session_id,
                occurred_at: Utc::now(),
            }),
        )?;
        self.sessions.update(session.clone(), expected)?;
        tracing::info!(session_id = %session_id, "session finalized");
        Ok(session)
    }

    fn resolve_item(&self, session: &CountSession, item_code: &str) -> DomainResult<CatalogItem> {
        let company_id = session
            .company_id()
            .ok_or_else(|| DomainError::invariant("session has no company"))?;
        self.catalog
            .resolve_code(item_code, company_id)?
            .ok_or_else(|| DomainError::item_not_found(item_code))
    }
}
