//! `stocktake-consolidation`: deriving one trusted quantity per slot and item.
//!
//! Consolidation is a pure computation over the live scan records of a slot's
//! sessions. It is recomputed on every read and never persisted as a separate
//! mutable fact, so it cannot drift from the records it derives from.

pub mod engine;
pub mod export;

pub use engine::{
    ConflictChoice, ItemResolution, ResolutionSource, RoleTotals, SlotConsolidation,
    apply_conflict_choices, consolidate_slot,
};
pub use export::{ExportLine, sum_for_export};
