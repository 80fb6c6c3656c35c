//! Facet counts
//!
//! Counts come from the cache so they describe the whole synced dataset, not
//! just the loaded page. If any count query fails the index falls back to the
//! in-memory collection and flags the result as approximate.

use serde::Serialize;
use std::collections::BTreeMap;

use super::facet::Facet;
use super::item::SyncItem;
use super::ports::LocalCache;
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct FacetCounts<F: Facet> {
    /// Unfiltered ("All") count
    pub total: usize,
    pub per_facet: BTreeMap<F, usize>,
    /// Counted over loaded items only
    pub approximate: bool,
}

impl<F: Facet> Default for FacetCounts<F> {
    fn default() -> Self {
        Self {
            total: 0,
            per_facet: BTreeMap::new(),
            approximate: true,
        }
    }
}

impl<F: Facet> FacetCounts<F> {
    pub fn get(&self, facet: F) -> usize {
        self.per_facet.get(&facet).copied().unwrap_or(0)
    }
}

/// One count query per declared facet plus an unfiltered total
pub async fn count_from_cache<T: SyncItem, F: Facet>(cache: &dyn LocalCache<T>) -> Result<FacetCounts<F>> {
    let total = cache.count(None).await?;

    let mut per_facet = BTreeMap::new();
    for facet in F::all() {
        let predicate = facet.predicate();
        per_facet.insert(*facet, cache.count(Some(&predicate)).await?);
    }

    Ok(FacetCounts {
        total,
        per_facet,
        approximate: false,
    })
}

pub fn count_in_memory<T: SyncItem, F: Facet>(items: &[T]) -> FacetCounts<F> {
    let per_facet = F::all()
        .iter()
        .map(|facet| (*facet, items.iter().filter(|item| facet.matches(*item)).count()))
        .collect();

    FacetCounts {
        total: items.len(),
        per_facet,
        approximate: true,
    }
}

/// Cache counts, or approximate counts over `loaded` when the cache fails
pub async fn facet_counts<T: SyncItem, F: Facet>(cache: &dyn LocalCache<T>, loaded: &[T]) -> FacetCounts<F> {
    match count_from_cache(cache).await {
        Ok(counts) => {
            tracing::debug!("Loaded facet counts from cache (total: {})", counts.total);
            counts
        }
        Err(e) => {
            tracing::warn!("Facet count query failed, counting loaded items: {}", e);
            count_in_memory(loaded)
        }
    }
}
