//! ERP stock lookup port and the bounded-concurrency comparison runner.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use stocktake_core::{CompanyId, Quantity};
use stocktake_reconciliation::{ErpStockLine, StockComparison, classify_stock};

/// Failure of one external stock lookup.
#[derive(Debug, Error)]
pub enum ExternalLookupError {
    #[error("erp lookup timed out")]
    Timeout,

    #[error("erp unavailable: {0}")]
    Unavailable(String),
}

/// Read-only stock lookup against the external ERP.
#[async_trait]
pub trait ErpStockSource: Send + Sync {
    async fn stock_lookup(
        &self,
        item_code: &str,
        company_id: CompanyId,
        external_warehouse_id: Option<&str>,
    ) -> Result<Vec<ErpStockLine>, ExternalLookupError>;
}

/// Runs stock comparisons window by window, never more than `window_size`
/// lookups in flight at once.
pub struct ErpComparisonRunner {
    source: Arc<dyn ErpStockSource>,
    window_size: usize,
}

impl ErpComparisonRunner {
    pub const DEFAULT_WINDOW: usize = 8;

    pub fn new(source: Arc<dyn ErpStockSource>) -> Self {
        Self {
            source,
            window_size: Self::DEFAULT_WINDOW,
        }
    }

    pub fn with_window_size(source: Arc<dyn ErpStockSource>, window_size: usize) -> Self {
        Self {
            source,
            window_size: window_size.max(1),
        }
    }

    /// Compare physical quantities (per item code) against the ERP.
    ///
    /// A failed lookup, including a panicked task, downgrades that item to
    /// `missing_in_erp`; one slow or broken code never sinks the whole run.
    /// Output is sorted by item code, independent of completion order.
    pub async fn compare(
        &self,
        physical: Vec<(String, Quantity)>,
        company_id: CompanyId,
        external_warehouse_id: Option<&str>,
    ) -> Vec<StockComparison> {
        let mut results = Vec::with_capacity(physical.len());

        for window in physical.chunks(self.window_size) {
            let mut lookups = tokio::task::JoinSet::new();
            for (idx, (code, _)) in window.iter().enumerate() {
                let source = Arc::clone(&self.source);
                let code = code.clone();
                let warehouse = external_warehouse_id.map(str::to_string);
                lookups.spawn(async move {
                    let lookup = source
                        .stock_lookup(&code, company_id, warehouse.as_deref())
                        .await;
                    (idx, lookup)
                });
            }

            let mut completed = vec![false; window.len()];
            while let Some(joined) = lookups.join_next().await {
                match joined {
                    Ok((idx, lookup)) => {
                        completed[idx] = true;
                        let (code, qty) = &window[idx];
                        match lookup {
                            Ok(lines) => results.push(classify_stock(
                                code,
                                *qty,
                                Some(&lines),
                                external_warehouse_id,
                            )),
                            Err(err) => {
                                tracing::warn!(item_code = %code, error = %err, "erp lookup failed");
                                results.push(classify_stock(code, *qty, None, external_warehouse_id));
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "erp lookup task failed to complete");
                    }
                }
            }
            // Items whose task never returned a value (panic, abort).
            for (idx, done) in completed.iter().enumerate() {
                if !done {
                    let (code, qty) = &window[idx];
                    results.push(classify_stock(code, *qty, None, external_warehouse_id));
                }
            }
        }

        results.sort_by(|a, b| a.item_code.cmp(&b.item_code));
        results
    }
}

/// Test double: canned stock lines per item code, per-code failure injection,
/// and a high-water mark of concurrent lookups.
#[derive(Default)]
pub struct InMemoryErpStockSource {
    lines: RwLock<HashMap<String, Vec<ErpStockLine>>>,
    failing: RwLock<HashSet<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryErpStockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lines(&self, item_code: &str, lines: Vec<ErpStockLine>) {
        self.lines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item_code.to_string(), lines);
    }

    /// Every subsequent lookup of this code fails.
    pub fn fail_code(&self, item_code: &str) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item_code.to_string());
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ErpStockSource for InMemoryErpStockSource {
    async fn stock_lookup(
        &self,
        item_code: &str,
        _company_id: CompanyId,
        _external_warehouse_id: Option<&str>,
    ) -> Result<Vec<ErpStockLine>, ExternalLookupError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Let the other lookups of the window get in flight.
        tokio::task::yield_now().await;

        let result = if self
            .failing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(item_code)
        {
            Err(ExternalLookupError::Unavailable(format!(
                "injected failure for {item_code}"
            )))
        } else {
            Ok(self
                .lines
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(item_code)
                .cloned()
                .unwrap_or_default())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
