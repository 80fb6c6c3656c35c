//! Display projection
//!
//! The visible list is always rebuilt from its inputs: the loaded collection,
//! the current search results, the facet-filtered cache results, the filter
//! selection, and the display limit. Nothing patches it in place.

use serde::Serialize;
use std::collections::BTreeSet;

use super::facet::{selection_predicate, Facet};
use super::item::SyncItem;

/// What the user has asked to see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSelection<F: Facet> {
    pub search_text: String,
    pub selected_facets: BTreeSet<F>,
}

impl<F: Facet> Default for FilterSelection<F> {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            selected_facets: BTreeSet::new(),
        }
    }
}

impl<F: Facet> FilterSelection<F> {
    /// Search text with surrounding whitespace removed
    pub fn query(&self) -> &str {
        self.search_text.trim()
    }

    /// Whether search or facet filtering is in effect
    pub fn is_active(&self) -> bool {
        !self.query().is_empty() || !self.selected_facets.is_empty()
    }
}

/// Which input the display was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Search,
    Facets,
    Collection,
}

/// The list handed to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct DisplayState<T> {
    pub visible_items: Vec<T>,
    pub display_limit: usize,
    pub has_more: bool,
    pub source: SourceKind,
    /// Length of the full filtered result before the cap
    pub total_matches: usize,
}

impl<T> Default for DisplayState<T> {
    fn default() -> Self {
        Self {
            visible_items: Vec::new(),
            display_limit: 0,
            has_more: false,
            source: SourceKind::Collection,
            total_matches: 0,
        }
    }
}

/// Inputs of one projection
pub struct ProjectionInputs<'a, T, F: Facet> {
    pub collection: &'a [T],
    pub search_results: &'a [T],
    pub filtered_from_cache: &'a [T],
    pub selection: &'a FilterSelection<F>,
}

/// Pick the source list for the current selection, narrowed and sorted newest first
fn source_refs<'a, T: SyncItem, F: Facet>(inputs: &ProjectionInputs<'a, T, F>) -> (SourceKind, Vec<&'a T>) {
    let selection = inputs.selection;
    let predicate = selection_predicate(&selection.selected_facets);
    let narrowed = |items: &'a [T]| -> Vec<&'a T> {
        items
            .iter()
            .filter(|item| predicate.as_ref().map_or(true, |p| p.matches(*item)))
            .collect()
    };

    let (kind, mut items) = if !selection.query().is_empty() {
        (SourceKind::Search, narrowed(inputs.search_results))
    } else if !selection.selected_facets.is_empty() {
        // The cache query is only a pre-filter; the predicate decides
        (SourceKind::Facets, narrowed(inputs.filtered_from_cache))
    } else {
        (SourceKind::Collection, inputs.collection.iter().collect())
    };

    items.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
    (kind, items)
}

/// The full filtered result before the display cap
pub fn filtered_source<T: SyncItem, F: Facet>(inputs: &ProjectionInputs<'_, T, F>) -> (SourceKind, Vec<T>) {
    let (kind, items) = source_refs(inputs);
    (kind, items.into_iter().cloned().collect())
}

/// Cap the filtered source at `display_limit`
pub fn project<T: SyncItem, F: Facet>(
    inputs: &ProjectionInputs<'_, T, F>,
    display_limit: usize,
) -> DisplayState<T> {
    let (source, items) = source_refs(inputs);
    let total_matches = items.len();

    DisplayState {
        visible_items: items.into_iter().take(display_limit).cloned().collect(),
        display_limit,
        has_more: total_matches > display_limit,
        source,
        total_matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::facet::ItemFacet;
    use crate::collection::item::{Category, Item};
    use chrono::{Duration, Utc};

    fn dated(id: &str, minutes_ago: i64, category: Category, tags: &[&str]) -> Item {
        let mut item = Item::new_local(format!("content {}", id), category).with_tags(tags.iter().copied());
        item.id = id.to_string();
        item.created_at = Utc::now() - Duration::minutes(minutes_ago);
        item
    }

    #[test]
    fn test_unfiltered_uses_collection_sorted() {
        let collection = vec![
            dated("old", 30, Category::Manual, &[]),
            dated("new", 1, Category::Manual, &[]),
        ];
        let selection = FilterSelection::<ItemFacet>::default();
        let inputs = ProjectionInputs {
            collection: &collection,
            search_results: &[],
            filtered_from_cache: &[],
            selection: &selection,
        };

        let display = project(&inputs, 10);

        assert_eq!(display.source, SourceKind::Collection);
        assert_eq!(display.visible_items[0].id, "new");
        assert!(!display.has_more);
    }

    #[test]
    fn test_search_results_narrowed_by_facets() {
        let search = vec![
            dated("tip", 5, Category::System, &["tips"]),
            dated("plain", 2, Category::Manual, &[]),
        ];
        let selection = FilterSelection {
            search_text: "content".to_string(),
            selected_facets: [ItemFacet::Tips].into(),
        };
        let inputs = ProjectionInputs {
            collection: &[],
            search_results: &search,
            filtered_from_cache: &[],
            selection: &selection,
        };

        let display = project(&inputs, 10);

        assert_eq!(display.source, SourceKind::Search);
        assert_eq!(display.visible_items.len(), 1);
        assert_eq!(display.visible_items[0].id, "tip");
    }

    #[test]
    fn test_facet_source_is_refiltered_in_memory() {
        // A loose cache pre-filter may return a system item tagged tips
        let from_cache = vec![
            dated("sys", 3, Category::System, &[]),
            dated("sys-tip", 1, Category::System, &["tips"]),
        ];
        let selection = FilterSelection {
            search_text: String::new(),
            selected_facets: [ItemFacet::System].into(),
        };
        let inputs = ProjectionInputs {
            collection: &[],
            search_results: &[],
            filtered_from_cache: &from_cache,
            selection: &selection,
        };

        let display = project(&inputs, 10);

        assert_eq!(display.source, SourceKind::Facets);
        let ids: Vec<_> = display.visible_items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["sys"]);
    }

    #[test]
    fn test_display_is_prefix_of_source() {
        let collection: Vec<Item> = (0..25)
            .map(|i| dated(&format!("item-{:02}", i), i, Category::Manual, &[]))
            .collect();
        let selection = FilterSelection::<ItemFacet>::default();
        let inputs = ProjectionInputs {
            collection: &collection,
            search_results: &[],
            filtered_from_cache: &[],
            selection: &selection,
        };

        for limit in [0, 1, 10, 25, 40] {
            let (_, source) = filtered_source(&inputs);
            let display = project(&inputs, limit);
            let expected: Vec<_> = source.iter().take(limit).map(|i| i.id.clone()).collect();
            let actual: Vec<_> = display.visible_items.iter().map(|i| i.id.clone()).collect();
            assert_eq!(actual, expected);
            assert_eq!(display.has_more, source.len() > limit);
        }
    }

    #[test]
    fn test_whitespace_search_is_inactive() {
        let selection = FilterSelection::<ItemFacet> {
            search_text: "   ".to_string(),
            selected_facets: BTreeSet::new(),
        };
        assert!(!selection.is_active());
    }
}
