use std::collections::HashMap;
use std::sync::RwLock;

use stocktake_core::{AggregateRoot, ExpectedVersion, LocationId, OperatorId, SessionId};
use stocktake_counting::{CountRole, CountSession};

use super::StoreError;

pub trait SessionStore: Send + Sync {
    /// Insert a new session. Fails with `Concurrency` when the id is taken.
    fn insert(&self, session: CountSession) -> Result<(), StoreError>;
    /// Insert a FinalAdjustment session only if the slot has none yet.
    ///
    /// Absence check and insert happen under one write lock; this is what
    /// serializes competing auto-saves, the loser gets `Concurrency`.
    fn insert_adjustment_if_absent(
        &self,
        slot_id: LocationId,
        session: CountSession,
    ) -> Result<(), StoreError>;
    fn update(&self, session: CountSession, expected: ExpectedVersion) -> Result<(), StoreError>;
    fn get(&self, session_id: SessionId) -> Result<CountSession, StoreError>;
    /// Open session of one (slot, role, operator) triple, for idempotent resume.
    fn find_open(
        &self,
        slot_id: LocationId,
        role: CountRole,
        operator: OperatorId,
    ) -> Result<Option<CountSession>, StoreError>;
    fn list_for_slot(&self, slot_id: LocationId) -> Result<Vec<CountSession>, StoreError>;
    /// Hard removal. Compensation only; sessions are otherwise never deleted.
    fn remove(&self, session_id: SessionId) -> Result<(), StoreError>;
}

/// In-memory session store. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: RwLock<HashMap<SessionId, CountSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: CountSession) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let id = session.id_typed();
        if inner.contains_key(&id) {
            return Err(StoreError::Concurrency(format!(
                "session {id} already exists"
            )));
        }
        inner.insert(id, session);
        Ok(())
    }

    fn insert_adjustment_if_absent(
        &self,
        slot_id: LocationId,
        session: CountSession,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        if inner
            .values()
            .any(|s| s.slot_id() == Some(slot_id) && s.role() == CountRole::FinalAdjustment)
        {
            return Err(StoreError::Concurrency(format!(
                "slot {slot_id} already has a final adjustment"
            )));
        }
        let id = session.id_typed();
        if inner.contains_key(&id) {
            return Err(StoreError::Concurrency(format!(
                "session {id} already exists"
            )));
        }
        inner.insert(id, session);
        Ok(())
    }

    fn update(&self, session: CountSession, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let id = session.id_typed();
        let current = inner.get(&id).ok_or(StoreError::NotFound)?;
        if !expected.matches(current.version()) {
            return Err(StoreError::Concurrency(format!(
                "session {id}: expected {expected:?}, found {}",
                current.version()
            )));
        }
        inner.insert(id, session);
        Ok(())
    }

    fn get(&self, session_id: SessionId) -> Result<CountSession, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::poisoned())?;
        inner.get(&session_id).cloned().ok_or(StoreError::NotFound)
    }

    fn find_open(
        &self,
        slot_id: LocationId,
        role: CountRole,
        operator: OperatorId,
    ) -> Result<Option<CountSession>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(inner
            .values()
            .find(|s| {
                s.is_open()
                    && s.slot_id() == Some(slot_id)
                    && s.role() == role
                    && s.operator() == Some(operator)
            })
            .cloned())
    }

    fn list_for_slot(&self, slot_id: LocationId) -> Result<Vec<CountSession>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(inner
            .values()
            .filter(|s| s.slot_id() == Some(slot_id))
            .cloned()
            .collect())
    }

    fn remove(&self, session_id: SessionId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        inner.remove(&session_id).ok_or(StoreError::NotFound)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stocktake_core::{Aggregate, CompanyId};
    use stocktake_counting::{CountingCommand, OpenSession};

    fn open_session(slot_id: LocationId, role: CountRole, operator: OperatorId) -> CountSession {
        let session_id = SessionId::new();
        let mut session = CountSession::empty(session_id);
        let events = session
            .handle(&CountingCommand::OpenSession(OpenSession {
                session_id,
                company_id: CompanyId::new(),
                slot_id,
                role,
                operator,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        session.apply(&events[0]);
        session
    }

    #[test]
    fn insert_requires_absence() {
        let store = InMemorySessionStore::new();
        let session = open_session(LocationId::new(), CountRole::FirstCount, OperatorId::new());

        store.insert(session.clone()).unwrap();
        let err = store.insert(session).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }

    #[test]
    fn adjustment_insert_is_conditional_on_the_slot() {
        let store = InMemorySessionStore::new();
        let slot = LocationId::new();

        // Counting sessions on the slot do not block the adjustment.
        let count = open_session(slot, CountRole::FirstCount, OperatorId::new());
        store.insert(count).unwrap();

        let first = open_session(slot, CountRole::FinalAdjustment, OperatorId::new());
        store.insert_adjustment_if_absent(slot, first).unwrap();

        let second = open_session(slot, CountRole::FinalAdjustment, OperatorId::new());
        let err = store.insert_adjustment_if_absent(slot, second).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        // A different slot is unaffected.
        let other_slot = LocationId::new();
        let other = open_session(other_slot, CountRole::FinalAdjustment, OperatorId::new());
        store.insert_adjustment_if_absent(other_slot, other).unwrap();
    }

    #[test]
    fn update_checks_the_loaded_version() {
        let store = InMemorySessionStore::new();
        let session = open_session(LocationId::new(), CountRole::FirstCount, OperatorId::new());
        store.insert(session.clone()).unwrap();

        let stale = ExpectedVersion::Exact(session.version() + 1);
        let err = store.update(session.clone(), stale).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        store
            .update(session.clone(), ExpectedVersion::Exact(session.version()))
            .unwrap();
    }

    #[test]
    fn find_open_matches_the_full_triple() {
        let store = InMemorySessionStore::new();
        let slot = LocationId::new();
        let operator = OperatorId::new();
        let session = open_session(slot, CountRole::FirstCount, operator);
        store.insert(session.clone()).unwrap();

        let found = store
            .find_open(slot, CountRole::FirstCount, operator)
            .unwrap();
        assert_eq!(found.map(|s| s.id_typed()), Some(session.id_typed()));

        assert!(
            store
                .find_open(slot, CountRole::SecondCount, operator)
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_open(slot, CountRole::FirstCount, OperatorId::new())
                .unwrap()
                .is_none()
        );
    }
}
