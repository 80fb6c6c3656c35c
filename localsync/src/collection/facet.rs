//! Facet predicates
//!
//! Every facet declares its matching rule once as a [`Predicate`]. The same
//! value is evaluated in memory by [`Predicate::matches`] and translated into
//! a cache query by the storage adapters, so the two can never disagree about
//! what a facet means.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;

use super::item::SyncItem;

/// A small boolean language over item tags and categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    HasTag(String),
    InCategory(String),
    Not(Box<Predicate>),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn tag(tag: impl Into<String>) -> Self {
        Predicate::HasTag(tag.into())
    }

    pub fn category(category: impl Into<String>) -> Self {
        Predicate::InCategory(category.into())
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::All(mut parts) => {
                parts.push(other);
                Predicate::All(parts)
            }
            first => Predicate::All(vec![first, other]),
        }
    }

    pub fn any<I: IntoIterator<Item = Predicate>>(parts: I) -> Self {
        Predicate::Any(parts.into_iter().collect())
    }

    /// Evaluate against an item. Empty `All` is true, empty `Any` is false.
    pub fn matches<T: SyncItem>(&self, item: &T) -> bool {
        match self {
            Predicate::HasTag(tag) => item.has_tag(tag),
            Predicate::InCategory(category) => item.category() == category,
            Predicate::Not(inner) => !inner.matches(item),
            Predicate::All(parts) => parts.iter().all(|p| p.matches(item)),
            Predicate::Any(parts) => parts.iter().any(|p| p.matches(item)),
        }
    }
}

/// A named filter over a collection
pub trait Facet: Copy + Eq + Ord + Hash + Debug + Send + Sync + 'static {
    /// Every declared facet, in display order
    fn all() -> &'static [Self];

    fn key(&self) -> &'static str;

    fn predicate(&self) -> Predicate;

    fn matches<T: SyncItem>(&self, item: &T) -> bool {
        self.predicate().matches(item)
    }
}

/// OR of the selected facets, or `None` when nothing is selected
pub fn selection_predicate<F: Facet>(selected: &BTreeSet<F>) -> Option<Predicate> {
    if selected.is_empty() {
        return None;
    }
    Some(Predicate::any(selected.iter().map(Facet::predicate)))
}

/// Keep only items matching the selection (all items when nothing is selected)
pub fn filter_by_selection<T: SyncItem, F: Facet>(items: &[T], selected: &BTreeSet<F>) -> Vec<T> {
    match selection_predicate(selected) {
        Some(predicate) => items
            .iter()
            .filter(|item| predicate.matches(*item))
            .cloned()
            .collect(),
        None => items.to_vec(),
    }
}

/// Facets of the memories collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemFacet {
    Focus,
    Focused,
    Distracted,
    Tips,
    System,
    Interesting,
    Manual,
    Productivity,
    Health,
    Communication,
    Learning,
    Other,
}

const TIPS: &str = "tips";
const FOCUS: &str = "focus";

impl Facet for ItemFacet {
    fn all() -> &'static [Self] {
        &[
            ItemFacet::Focus,
            ItemFacet::Focused,
            ItemFacet::Distracted,
            ItemFacet::Tips,
            ItemFacet::System,
            ItemFacet::Interesting,
            ItemFacet::Manual,
            ItemFacet::Productivity,
            ItemFacet::Health,
            ItemFacet::Communication,
            ItemFacet::Learning,
            ItemFacet::Other,
        ]
    }

    fn key(&self) -> &'static str {
        match self {
            ItemFacet::Focus => "focus",
            ItemFacet::Focused => "focused",
            ItemFacet::Distracted => "distracted",
            ItemFacet::Tips => "tips",
            ItemFacet::System => "system",
            ItemFacet::Interesting => "interesting",
            ItemFacet::Manual => "manual",
            ItemFacet::Productivity => "productivity",
            ItemFacet::Health => "health",
            ItemFacet::Communication => "communication",
            ItemFacet::Learning => "learning",
            ItemFacet::Other => "other",
        }
    }

    fn predicate(&self) -> Predicate {
        match self {
            // System entries that are neither tips nor focus events
            ItemFacet::System => Predicate::category("system")
                .and(Predicate::tag(TIPS).negate())
                .and(Predicate::tag(FOCUS).negate()),
            ItemFacet::Interesting => {
                Predicate::category("interesting").and(Predicate::tag(TIPS).negate())
            }
            ItemFacet::Manual => Predicate::category("manual").and(Predicate::tag(TIPS).negate()),
            tagged => Predicate::tag(tagged.key()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::item::{Category, Item};

    fn item(category: Category, tags: &[&str]) -> Item {
        Item::new_local("x", category).with_tags(tags.iter().copied())
    }

    #[test]
    fn test_system_facet_excludes_tips_and_focus() {
        assert!(ItemFacet::System.matches(&item(Category::System, &[])));
        assert!(!ItemFacet::System.matches(&item(Category::System, &["tips"])));
        assert!(!ItemFacet::System.matches(&item(Category::System, &["focus"])));
        assert!(!ItemFacet::System.matches(&item(Category::Manual, &[])));
    }

    #[test]
    fn test_tag_facets_ignore_category() {
        let tip = item(Category::System, &["tips", "health"]);
        assert!(ItemFacet::Tips.matches(&tip));
        assert!(ItemFacet::Health.matches(&tip));
        assert!(!ItemFacet::Learning.matches(&tip));
    }

    #[test]
    fn test_selection_is_or_of_facets() {
        let selected: BTreeSet<ItemFacet> = [ItemFacet::Tips, ItemFacet::Manual].into();
        let items = vec![
            item(Category::System, &["tips"]),
            item(Category::Manual, &[]),
            item(Category::Interesting, &[]),
        ];

        let kept = filter_by_selection(&items, &selected);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_empty_selection_has_no_predicate() {
        let selected: BTreeSet<ItemFacet> = BTreeSet::new();
        assert!(selection_predicate(&selected).is_none());
        assert!(!Predicate::Any(vec![]).matches(&item(Category::Manual, &[])));
        assert!(Predicate::All(vec![]).matches(&item(Category::Manual, &[])));
    }
}
