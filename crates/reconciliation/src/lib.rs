//! `stocktake-reconciliation`: ERP diff-and-recount domain.
//!
//! Pure comparison classification (`match` / `diff` / `missing_in_erp`) plus
//! the `RecountBatch` aggregate: a generated worklist of discrepancy items,
//! assigned and approved one slot at a time.

pub mod batch;
pub mod comparison;

pub use batch::{
    ApproveSlot, AssignSlot, BatchCreated, CreateBatch, FinalizeSlotRecount, RecordRecount,
    RecountBatch, RecountBatchCommand, RecountBatchEvent, RecountItem, RecountItemState,
    RecountRecorded, RecountSeed, RejectSlot, SlotApproved, SlotAssigned, SlotRecountFinalized,
    SlotRejected,
};
pub use comparison::{ComparisonState, ErpStockLine, StockComparison, classify_stock};
