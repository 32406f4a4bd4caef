//! Item catalog resolution port, with a read-through cache.
//!
//! Scan codes are resolved on every scan; the cache keeps the hot path off
//! the backing catalog. Misses are deliberately not cached, so items added to
//! the catalog mid-count become resolvable without any invalidation step.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stocktake_core::{CompanyId, DomainError, ItemId};

/// Catalog lookup failure. Distinct from "not found", which is `Ok(None)`.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("catalog lookup failed: {0}")]
    Internal(String),
}

impl LookupError {
    fn poisoned() -> Self {
        Self::Internal("lock poisoned".to_string())
    }
}

impl From<LookupError> for DomainError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::Internal(msg) => DomainError::invariant(msg),
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_id: ItemId,
    pub code: String,
    pub description: String,
    pub unit: String,
}

pub trait CatalogResolver: Send + Sync {
    fn resolve_code(
        &self,
        code: &str,
        company_id: CompanyId,
    ) -> Result<Option<CatalogItem>, LookupError>;

    fn find_by_id(
        &self,
        item_id: ItemId,
        company_id: CompanyId,
    ) -> Result<Option<CatalogItem>, LookupError>;
}

/// Read-through cache over any resolver. Hits populate both directions of the
/// cache (code to item and id to item); misses pass through uncached.
#[derive(Debug, Default)]
pub struct CachedCatalog<R> {
    inner: R,
    by_code: RwLock<HashMap<(CompanyId, String), CatalogItem>>,
    by_id: RwLock<HashMap<(CompanyId, ItemId), CatalogItem>>,
}

impl<R> CachedCatalog<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            by_code: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
        }
    }

    fn remember(&self, company_id: CompanyId, item: &CatalogItem) -> Result<(), LookupError> {
        self.by_code
            .write()
            .map_err(|_| LookupError::poisoned())?
            .insert((company_id, item.code.clone()), item.clone());
        self.by_id
            .write()
            .map_err(|_| LookupError::poisoned())?
            .insert((company_id, item.item_id), item.clone());
        Ok(())
    }
}

impl<R: CatalogResolver> CatalogResolver for CachedCatalog<R> {
    fn resolve_code(
        &self,
        code: &str,
        company_id: CompanyId,
    ) -> Result<Option<CatalogItem>, LookupError> {
        {
            let cache = self.by_code.read().map_err(|_| LookupError::poisoned())?;
            if let Some(hit) = cache.get(&(company_id, code.to_string())) {
                return Ok(Some(hit.clone()));
            }
        }
        let resolved = self.inner.resolve_code(code, company_id)?;
        if let Some(item) = &resolved {
            self.remember(company_id, item)?;
        }
        Ok(resolved)
    }

    fn find_by_id(
        &self,
        item_id: ItemId,
        company_id: CompanyId,
    ) -> Result<Option<CatalogItem>, LookupError> {
        {
            let cache = self.by_id.read().map_err(|_| LookupError::poisoned())?;
            if let Some(hit) = cache.get(&(company_id, item_id)) {
                return Ok(Some(hit.clone()));
            }
        }
        let resolved = self.inner.find_by_id(item_id, company_id)?;
        if let Some(item) = &resolved {
            self.remember(company_id, item)?;
        }
        Ok(resolved)
    }
}

/// In-memory catalog backing tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: RwLock<Vec<(CompanyId, CatalogItem)>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, company_id: CompanyId, item: CatalogItem) -> Result<(), LookupError> {
        self.items
            .write()
            .map_err(|_| LookupError::poisoned())?
            .push((company_id, item));
        Ok(())
    }
}

impl CatalogResolver for InMemoryCatalog {
    fn resolve_code(
        &self,
        code: &str,
        company_id: CompanyId,
    ) -> Result<Option<CatalogItem>, LookupError> {
        let items = self.items.read().map_err(|_| LookupError::poisoned())?;
        Ok(items
            .iter()
            .find(|(c, item)| *c == company_id && item.code == code)
            .map(|(_, item)| item.clone()))
    }

    fn find_by_id(
        &self,
        item_id: ItemId,
        company_id: CompanyId,
    ) -> Result<Option<CatalogItem>, LookupError> {
        let items = self.items.read().map_err(|_| LookupError::poisoned())?;
        Ok(items
            .iter()
            .find(|(c, item)| *c == company_id && item.item_id == item_id)
            .map(|(_, item)| item.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        inner: InMemoryCatalog,
        calls: AtomicUsize,
    }

    impl CatalogResolver for CountingResolver {
        fn resolve_code(
            &self,
            code: &str,
            company_id: CompanyId,
        ) -> Result<Option<CatalogItem>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve_code(code, company_id)
        }

        fn find_by_id(
            &self,
            item_id: ItemId,
            company_id: CompanyId,
        ) -> Result<Option<CatalogItem>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(item_id, company_id)
        }
    }

    fn item(code: &str) -> CatalogItem {
        CatalogItem {
            item_id: ItemId::new(),
            code: code.to_string(),
            description: format!("item {code}"),
            unit: "pcs".to_string(),
        }
    }

    #[test]
    fn hits_are_cached_both_ways() {
        let company = CompanyId::new();
        let inner = InMemoryCatalog::new();
        let entry = item("SKU-1");
        inner.add(company, entry.clone()).unwrap();
        let resolver = CountingResolver {
            inner,
            calls: AtomicUsize::new(0),
        };
        let cached = CachedCatalog::new(resolver);

        let resolved = cached.resolve_code("SKU-1", company).unwrap().unwrap();
        assert_eq!(resolved, entry);
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);

        // Second resolve and the reverse lookup both hit the cache.
        cached.resolve_code("SKU-1", company).unwrap().unwrap();
        cached.find_by_id(entry.item_id, company).unwrap().unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn misses_are_not_cached() {
        let company = CompanyId::new();
        let inner = InMemoryCatalog::new();
        let resolver = CountingResolver {
            inner,
            calls: AtomicUsize::new(0),
        };
        let cached = CachedCatalog::new(resolver);

        assert!(cached.resolve_code("SKU-LATE", company).unwrap().is_none());

        // The item shows up later; the earlier miss must not shadow it.
        let entry = item("SKU-LATE");
        cached.inner.inner.add(company, entry.clone()).unwrap();
        let resolved = cached.resolve_code("SKU-LATE", company).unwrap();
        assert_eq!(resolved, Some(entry));
    }

    #[test]
    fn companies_are_isolated() {
        let company_a = CompanyId::new();
        let company_b = CompanyId::new();
        let catalog = InMemoryCatalog::new();
        catalog.add(company_a, item("SKU-1")).unwrap();

        assert!(catalog.resolve_code("SKU-1", company_a).unwrap().is_some());
        assert!(catalog.resolve_code("SKU-1", company_b).unwrap().is_none());
    }
}
