//! Physical-vs-ERP stock comparison (pure classification).

use serde::{Deserialize, Serialize};

use stocktake_core::Quantity;

/// One stock line as returned by the external ERP lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpStockLine {
    pub warehouse_id: String,
    pub existing_qty: Quantity,
    pub reserved_qty: Quantity,
}

/// Classification of one compared item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonState {
    Match,
    Diff,
    MissingInErp,
}

/// Comparison result for one item code. A plain value: independent of the
/// order in which lookups completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockComparison {
    pub item_code: String,
    pub physical_qty: Quantity,
    pub erp_qty: Quantity,
    /// physical minus ERP.
    pub diff: Quantity,
    pub state: ComparisonState,
}

/// Classify one item against its ERP lookup result.
///
/// `lookup` is `None` when the lookup failed or timed out; that is downgraded
/// to `missing_in_erp`, never an error. The ERP quantity is the sum of
/// `existing_qty` over the lines, optionally restricted to one external
/// warehouse id.
pub fn classify_stock(
    item_code: &str,
    physical_qty: Quantity,
    lookup: Option<&[ErpStockLine]>,
    external_warehouse_id: Option<&str>,
) -> StockComparison {
    let lines: Vec<&ErpStockLine> = lookup
        .unwrap_or(&[])
        .iter()
        .filter(|line| external_warehouse_id.is_none_or(|w| line.warehouse_id == w))
        .collect();

    if lines.is_empty() {
        return StockComparison {
            item_code: item_code.to_string(),
            physical_qty,
            erp_qty: Quantity::ZERO,
            diff: physical_qty,
            state: ComparisonState::MissingInErp,
        };
    }

    let erp_qty: Quantity = lines.iter().map(|line| line.existing_qty).sum();
    let diff = physical_qty - erp_qty;
    let state = if diff.is_zero() {
        ComparisonState::Match
    } else {
        ComparisonState::Diff
    };

    StockComparison {
        item_code: item_code.to_string(),
        physical_qty,
        erp_qty,
        diff,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(warehouse_id: &str, existing: i64) -> ErpStockLine {
        ErpStockLine {
            warehouse_id: warehouse_id.to_string(),
            existing_qty: Quantity::from_units(existing),
            reserved_qty: Quantity::ZERO,
        }
    }

    #[test]
    fn equal_quantities_match() {
        let result = classify_stock(
            "SKU-1",
            Quantity::from_units(10),
            Some(&[line("ERP-01", 10)]),
            None,
        );
        assert_eq!(result.state, ComparisonState::Match);
        assert_eq!(result.diff, Quantity::ZERO);
    }

    #[test]
    fn surplus_is_a_positive_diff() {
        let result = classify_stock(
            "SKU-1",
            Quantity::from_units(10),
            Some(&[line("ERP-01", 7)]),
            None,
        );
        assert_eq!(result.state, ComparisonState::Diff);
        assert_eq!(result.diff, Quantity::from_units(3));
    }

    #[test]
    fn absent_lookup_is_missing_in_erp() {
        for lookup in [None, Some(&[][..])] {
            let result = classify_stock("SKU-1", Quantity::from_units(10), lookup, None);
            assert_eq!(result.state, ComparisonState::MissingInErp);
            assert_eq!(result.erp_qty, Quantity::ZERO);
            assert_eq!(result.diff, Quantity::from_units(10));
        }
    }

    #[test]
    fn warehouse_filter_restricts_the_erp_side() {
        let lines = [line("ERP-01", 7), line("ERP-02", 3)];

        let unfiltered = classify_stock("SKU-1", Quantity::from_units(10), Some(&lines), None);
        assert_eq!(unfiltered.state, ComparisonState::Match);

        let filtered = classify_stock(
            "SKU-1",
            Quantity::from_units(10),
            Some(&lines),
            Some("ERP-01"),
        );
        assert_eq!(filtered.erp_qty, Quantity::from_units(7));
        assert_eq!(filtered.diff, Quantity::from_units(3));

        let unknown = classify_stock(
            "SKU-1",
            Quantity::from_units(10),
            Some(&lines),
            Some("ERP-99"),
        );
        assert_eq!(unknown.state, ComparisonState::MissingInErp);
    }
}
