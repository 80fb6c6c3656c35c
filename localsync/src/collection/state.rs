//! Controller state
//!
//! Owned by the controller's serialized context. Every field here is only
//! touched from jobs running on that context.

use serde::Serialize;
use std::collections::BTreeSet;
use tokio::time::Instant;

use super::facet::{filter_by_selection, Facet};
use super::facet_index::FacetCounts;
use super::item::{sort_newest_first, SyncItem};
use super::projector::{project, DisplayState, FilterSelection, ProjectionInputs};
use super::search::SearchEngine;
use super::undo::{PendingDeletionView, RemovedFrom, UndoSlot};

/// Everything the presentation layer observes, recomputed after every state change
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSnapshot<T, F: Facet> {
    pub display: DisplayState<T>,
    pub facet_counts: FacetCounts<F>,
    pub input_query: String,
    pub settled_query: String,
    pub selected_facets: BTreeSet<F>,
    pub is_loading: bool,
    pub is_loading_more: bool,
    pub is_searching: bool,
    pub is_filtering: bool,
    pub is_bulk_operation: bool,
    /// More unfiltered pages may exist in the cache or remote
    pub has_more_pages: bool,
    pub loaded_count: usize,
    pub error_message: Option<String>,
    pub pending_deletion: Option<PendingDeletionView<T>>,
    pub version: u64,
}

#[derive(Debug, Default)]
pub(crate) struct FacetRefresh {
    pub in_flight: bool,
    pub rerun: bool,
}

#[derive(Debug)]
pub(crate) struct CollectionState<T: SyncItem, F: Facet> {
    pub collection: Vec<T>,
    pub search_results: Vec<T>,
    pub filtered_from_cache: Vec<T>,
    pub filter: FilterSelection<F>,
    /// Bumped on every facet selection change; stale filter queries are dropped
    pub filter_generation: u64,
    pub page_size: usize,
    pub display_limit: usize,
    pub offset: usize,
    pub has_more_pages: bool,
    pub is_loading: bool,
    pub is_loading_more: bool,
    pub is_refreshing: bool,
    pub is_filtering: bool,
    pub is_bulk_operation: bool,
    pub full_sync_running: bool,
    pub loaded_once: bool,
    pub active: bool,
    pub last_synced_at: Option<Instant>,
    pub error_message: Option<String>,
    pub search: SearchEngine,
    pub undo: UndoSlot<T>,
    pub facet_counts: FacetCounts<F>,
    pub facet_refresh: FacetRefresh,
    facets_dirty: bool,
}

impl<T: SyncItem, F: Facet> CollectionState<T, F> {
    pub fn new(page_size: usize) -> Self {
        Self {
            collection: Vec::new(),
            search_results: Vec::new(),
            filtered_from_cache: Vec::new(),
            filter: FilterSelection::default(),
            filter_generation: 0,
            page_size,
            display_limit: page_size,
            offset: 0,
            has_more_pages: true,
            is_loading: false,
            is_loading_more: false,
            is_refreshing: false,
            is_filtering: false,
            is_bulk_operation: false,
            full_sync_running: false,
            loaded_once: false,
            active: false,
            last_synced_at: None,
            error_message: None,
            search: SearchEngine::default(),
            undo: UndoSlot::default(),
            facet_counts: FacetCounts::default(),
            facet_refresh: FacetRefresh::default(),
            facets_dirty: false,
        }
    }

    pub fn snapshot(&self, version: u64) -> CollectionSnapshot<T, F> {
        let inputs = ProjectionInputs {
            collection: &self.collection,
            search_results: &self.search_results,
            filtered_from_cache: &self.filtered_from_cache,
            selection: &self.filter,
        };

        CollectionSnapshot {
            display: project(&inputs, self.display_limit),
            facet_counts: self.facet_counts.clone(),
            input_query: self.search.input_query().to_string(),
            settled_query: self.search.settled_query().to_string(),
            selected_facets: self.filter.selected_facets.clone(),
            is_loading: self.is_loading,
            is_loading_more: self.is_loading_more,
            is_searching: self.search.is_searching(),
            is_filtering: self.is_filtering,
            is_bulk_operation: self.is_bulk_operation,
            has_more_pages: self.has_more_pages,
            loaded_count: self.collection.len(),
            error_message: self.error_message.clone(),
            pending_deletion: self.undo.view(),
            version,
        }
    }

    /// Whether facet counts need recomputing; clears the flag
    pub fn take_facets_dirty(&mut self) -> bool {
        std::mem::take(&mut self.facets_dirty)
    }

    pub fn mark_facets_dirty(&mut self) {
        self.facets_dirty = true;
    }

    /// Display cap back to one page. Unfiltered, the cap never hides loaded items.
    pub fn reset_display_limit(&mut self) {
        self.display_limit = self.page_size;
        self.widen_for_collection();
    }

    fn widen_for_collection(&mut self) {
        if !self.filter.is_active() {
            self.display_limit = self.display_limit.max(self.collection.len());
        }
    }

    /// Drop the item waiting in the undo window from freshly loaded results
    pub fn without_pending(&self, mut items: Vec<T>) -> Vec<T> {
        if let Some(pending) = self.undo.pending() {
            let id = pending.item.id();
            items.retain(|item| item.id() != id);
        }
        items
    }

    /// Publish a freshly loaded first window as the collection
    pub fn replace_collection(&mut self, items: Vec<T>, window: usize) {
        let returned = items.len();
        self.collection = self.without_pending(items);
        self.offset = returned;
        self.has_more_pages = returned >= window;
        self.widen_for_collection();
        self.mark_facets_dirty();
    }

    /// Append a page, skipping ids already loaded. Returns how many were added.
    pub fn append_page(&mut self, items: Vec<T>) -> usize {
        let returned = items.len();
        let fresh: Vec<T> = self
            .without_pending(items)
            .into_iter()
            .filter(|item| !self.collection.iter().any(|c| c.id() == item.id()))
            .collect();
        let added = fresh.len();

        self.collection.extend(fresh);
        self.offset += returned;
        self.has_more_pages = returned >= self.page_size;
        if !self.filter.is_active() {
            self.display_limit += added;
        }
        self.mark_facets_dirty();
        added
    }

    pub fn find(&self, id: &str) -> Option<&T> {
        self.collection
            .iter()
            .chain(self.filtered_from_cache.iter())
            .chain(self.search_results.iter())
            .find(|item| item.id() == id)
    }

    /// Remove `id` from every source list so it disappears from the display at once
    pub fn remove_everywhere(&mut self, id: &str) -> Option<(T, RemovedFrom)> {
        let item = self.find(id)?.clone();
        let removed_from = RemovedFrom {
            collection: remove_by_id(&mut self.collection, id),
            filtered: remove_by_id(&mut self.filtered_from_cache, id),
            search: remove_by_id(&mut self.search_results, id),
        };
        self.mark_facets_dirty();
        Some((item, removed_from))
    }

    /// Put an item back into the lists it was removed from, re-sorted
    pub fn restore(&mut self, item: T, removed_from: RemovedFrom) {
        if removed_from.collection {
            insert_sorted(&mut self.collection, item.clone());
        }
        if removed_from.filtered {
            insert_sorted(&mut self.filtered_from_cache, item.clone());
        }
        if removed_from.search {
            insert_sorted(&mut self.search_results, item);
        }
        self.mark_facets_dirty();
    }

    /// Add an item to the loaded collection, and to the facet results when it
    /// matches the selection, unless it is already there
    pub fn insert(&mut self, item: T) {
        let selected = &self.filter.selected_facets;
        if !selected.is_empty() && !filter_by_selection(std::slice::from_ref(&item), selected).is_empty() {
            insert_sorted(&mut self.filtered_from_cache, item.clone());
        }
        insert_sorted(&mut self.collection, item);
        self.widen_for_collection();
        self.mark_facets_dirty();
    }

    /// Apply `f` to every in-memory copy of `id`. Returns whether any copy existed.
    pub fn update_everywhere(&mut self, id: &str, mut f: impl FnMut(&mut T)) -> bool {
        let mut found = false;
        for list in [
            &mut self.collection,
            &mut self.filtered_from_cache,
            &mut self.search_results,
        ] {
            for item in list.iter_mut().filter(|item| item.id() == id) {
                f(item);
                found = true;
            }
        }
        if found {
            self.mark_facets_dirty();
        }
        found
    }

    /// Every item currently known in memory, including one pending deletion
    pub fn known_ids(&self) -> Vec<String> {
        let mut ids: BTreeSet<String> = self
            .collection
            .iter()
            .chain(self.filtered_from_cache.iter())
            .chain(self.search_results.iter())
            .map(|item| item.id().to_string())
            .collect();
        if let Some(pending) = self.undo.pending() {
            ids.insert(pending.item.id().to_string());
        }
        ids.into_iter().collect()
    }

    pub fn clear_items(&mut self) {
        self.collection.clear();
        self.filtered_from_cache.clear();
        self.search_results.clear();
        self.offset = 0;
        self.mark_facets_dirty();
    }
}

fn remove_by_id<T: SyncItem>(items: &mut Vec<T>, id: &str) -> bool {
    let before = items.len();
    items.retain(|item| item.id() != id);
    items.len() != before
}

fn insert_sorted<T: SyncItem>(items: &mut Vec<T>, item: T) {
    if items.iter().any(|existing| existing.id() == item.id()) {
        return;
    }
    items.push(item);
    sort_newest_first(items);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::facet::ItemFacet;
    use crate::collection::item::{Category, Item};
    use chrono::{Duration, Utc};

    fn item(id: &str, minutes_ago: i64) -> Item {
        let mut item = Item::new_local(format!("note {}", id), Category::Manual);
        item.id = id.to_string();
        item.created_at = Utc::now() - Duration::minutes(minutes_ago);
        item
    }

    fn state() -> CollectionState<Item, ItemFacet> {
        CollectionState::new(3)
    }

    #[test]
    fn test_remove_and_restore_round_trip() {
        let mut state = state();
        state.replace_collection(vec![item("a", 1), item("b", 2), item("c", 3)], 3);
        state.search_results = vec![item("b", 2)];

        let (removed, from) = state.remove_everywhere("b").unwrap();
        assert!(from.collection && from.search && !from.filtered);
        assert_eq!(state.collection.len(), 2);
        assert!(state.search_results.is_empty());

        state.restore(removed, from);
        let ids: Vec<_> = state.collection.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(state.search_results.len(), 1);
    }

    #[test]
    fn test_append_page_skips_duplicates_and_advances_offset() {
        let mut state = state();
        state.replace_collection(vec![item("a", 1), item("b", 2), item("c", 3)], 3);
        assert!(state.has_more_pages);

        let added = state.append_page(vec![item("c", 3), item("d", 4)]);

        assert_eq!(added, 1);
        assert_eq!(state.offset, 5);
        assert!(!state.has_more_pages);
        assert_eq!(state.display_limit, 4);
    }

    #[test]
    fn test_loaded_results_skip_pending_deletion() {
        let mut state = state();
        state.replace_collection(vec![item("a", 1), item("b", 2)], 3);
        let (removed, from) = state.remove_everywhere("a").unwrap();
        state
            .undo
            .begin(removed, from, std::time::Duration::from_secs(4));

        state.replace_collection(vec![item("a", 1), item("b", 2)], 3);

        assert_eq!(state.collection.len(), 1);
        assert_eq!(state.collection[0].id, "b");
    }

    #[test]
    fn test_snapshot_respects_display_limit_when_filtered() {
        let mut state = state();
        state.filter.selected_facets.insert(ItemFacet::Manual);
        state.filtered_from_cache = (0..5).map(|i| item(&i.to_string(), i)).collect();
        state.reset_display_limit();

        let snapshot = state.snapshot(1);

        assert_eq!(snapshot.display.visible_items.len(), 3);
        assert!(snapshot.display.has_more);
        assert_eq!(snapshot.display.total_matches, 5);
    }
}
