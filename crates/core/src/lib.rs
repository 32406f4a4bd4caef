//! `stocktake-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod event;
pub mod id;
pub mod principal;
pub mod quantity;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use event::Event;
pub use id::{BatchId, CompanyId, ItemId, LocationId, OperatorId, ScanRecordId, SessionId};
pub use principal::Operator;
pub use quantity::Quantity;
