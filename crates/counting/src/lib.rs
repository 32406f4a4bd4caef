//! `stocktake-counting`: count-session lifecycle.
//!
//! A count session is one continuous counting pass over a single slot. Scan
//! records are append-only rows; a mistaken scan is deleted individually, it
//! never invalidates the rest of the session.

pub mod session;

pub use session::{
    CountRole, CountSession, CountingCommand, CountingEvent, DeleteScan, FinalizeSession,
    OpenSession, QuantitySet, RecordScan, ScanDeleted, ScanRecord, ScanRecorded, SessionFinalized,
    SessionOpened, SessionState, SetQuantity,
};
