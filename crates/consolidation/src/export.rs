//! Warehouse-level export of consolidated quantities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stocktake_core::{ItemId, Quantity};

use crate::engine::SlotConsolidation;

/// One export row, consumed by downstream ERP upload tooling.
///
/// `quantity` keeps the exact value; the fixed 4-decimal string form is its
/// `Display` rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportLine {
    pub item_code: String,
    pub warehouse_code: String,
    pub quantity: Quantity,
}

/// Sum, per item code, the resolved quantity across all slots that currently
/// have a resolved value. Slots in conflict contribute nothing; items without
/// a code mapping are skipped (the caller decides whether to log them).
///
/// Output is ordered by item code.
pub fn sum_for_export<'a>(
    warehouse_code: &str,
    slots: impl IntoIterator<Item = (&'a SlotConsolidation, &'a BTreeMap<ItemId, String>)>,
) -> Vec<ExportLine> {
    let mut totals: BTreeMap<String, Quantity> = BTreeMap::new();

    for (consolidation, codes) in slots {
        for (item_id, quantity) in consolidation.resolved_quantities() {
            if let Some(code) = codes.get(&item_id) {
                *totals.entry(code.clone()).or_insert(Quantity::ZERO) += quantity;
            }
        }
    }

    totals
        .into_iter()
        .map(|(item_code, quantity)| ExportLine {
            item_code,
            warehouse_code: warehouse_code.to_string(),
            quantity,
        })
        .collect()
}
