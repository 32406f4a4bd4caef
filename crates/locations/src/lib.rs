//! `stocktake-locations`: the warehouse location hierarchy.
//!
//! One aggregate owns the whole Warehouse > Zone > Aisle > Slot tree, the
//! per-slot presence keys and the cascading closure state machine.

pub mod warehouse;

pub use warehouse::{
    AddAisle, AddSlot, AddZone, Aisle, AisleAdded, AisleClosed, CloseAisle, CloseWarehouse,
    CloseZone, Closure, CreateWarehouse, Slot, SlotAdded, Warehouse, WarehouseClosed,
    WarehouseCommand, WarehouseCreated, WarehouseEvent, Zone, ZoneAdded, ZoneClosed,
};
