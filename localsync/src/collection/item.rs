//! Collection item model
//!
//! The controller is generic over [`SyncItem`]; [`Item`] is the concrete
//! record shared by the SQLite cache and the HTTP remote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Who can see an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Visibility::Private => Visibility::Public,
            Visibility::Public => Visibility::Private,
        }
    }
}

impl FromStr for Visibility {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "public" => Ok(Visibility::Public),
            other => Err(AppError::Validation(format!("unknown visibility '{}'", other))),
        }
    }
}

/// Origin category of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    System,
    Interesting,
    Manual,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::System => "system",
            Category::Interesting => "interesting",
            Category::Manual => "manual",
        }
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Category::System),
            "interesting" => Ok(Category::Interesting),
            "manual" => Ok(Category::Manual),
            other => Err(AppError::Validation(format!("unknown category '{}'", other))),
        }
    }
}

/// Replication state of the local copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Synced,
    PendingCreate,
    PendingDelete,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Synced => "synced",
            SyncState::PendingCreate => "pending_create",
            SyncState::PendingDelete => "pending_delete",
        }
    }
}

impl FromStr for SyncState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncState::Synced),
            "pending_create" => Ok(SyncState::PendingCreate),
            "pending_delete" => Ok(SyncState::PendingDelete),
            other => Err(AppError::Validation(format!("unknown sync state '{}'", other))),
        }
    }
}

/// Accessors the controller, projector, and facet predicates need from an item
pub trait SyncItem: Clone + fmt::Debug + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;
    fn has_tag(&self, tag: &str) -> bool;
    fn category(&self) -> &str;
    fn content(&self) -> &str;
    fn visibility(&self) -> Visibility;
    fn set_content(&mut self, content: String);
    fn set_visibility(&mut self, visibility: Visibility);
    /// Record a local modification time
    fn touch(&mut self, at: DateTime<Utc>);
}

/// A note, task, or memory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub category: Category,
    pub content: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl Item {
    /// Create an item that has not reached the remote service yet
    pub fn new_local(content: impl Into<String>, category: Category) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tags: BTreeSet::new(),
            category,
            content: content.into(),
            visibility: Visibility::Private,
            sync_state: SyncState::PendingCreate,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

impl SyncItem for Item {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    fn category(&self) -> &str {
        self.category.as_str()
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn visibility(&self) -> Visibility {
        self.visibility
    }

    fn set_content(&mut self, content: String) {
        self.content = content;
    }

    fn set_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility;
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// Field-level update applied by id to the cache and to in-memory copies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Content(String),
    Visibility(Visibility),
}

impl FieldUpdate {
    pub fn apply_to<T: SyncItem>(&self, item: &mut T) {
        match self {
            FieldUpdate::Content(content) => item.set_content(content.clone()),
            FieldUpdate::Visibility(visibility) => item.set_visibility(*visibility),
        }
        item.touch(Utc::now());
    }
}

/// Sort newest first by creation time; ties broken by id so the order is total
pub fn sort_newest_first<T: SyncItem>(items: &mut [T]) {
    items.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_local_item_is_pending_create() {
        let item = Item::new_local("buy milk", Category::Manual);
        assert_eq!(item.sync_state, SyncState::PendingCreate);
        assert_eq!(item.visibility, Visibility::Private);
        assert!(!item.id.is_empty());
    }

    #[test]
    fn test_sort_newest_first_breaks_ties_by_id() {
        let now = Utc::now();
        let mut a = Item::new_local("a", Category::Manual);
        a.id = "b".to_string();
        a.created_at = now;
        let mut b = Item::new_local("b", Category::Manual);
        b.id = "a".to_string();
        b.created_at = now;
        let mut c = Item::new_local("c", Category::Manual);
        c.created_at = now + Duration::seconds(5);

        let mut items = vec![a, b, c.clone()];
        sort_newest_first(&mut items);

        assert_eq!(items[0].id, c.id);
        assert_eq!(items[1].id, "a");
        assert_eq!(items[2].id, "b");
    }

    #[test]
    fn test_field_update_touches_item() {
        let mut item = Item::new_local("draft", Category::Manual);
        let before = item.updated_at - Duration::seconds(10);
        item.updated_at = before;

        FieldUpdate::Visibility(Visibility::Public).apply_to(&mut item);

        assert_eq!(item.visibility, Visibility::Public);
        assert!(item.updated_at > before);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("public".parse::<Visibility>().unwrap(), Visibility::Public);
        assert_eq!("system".parse::<Category>().unwrap(), Category::System);
        assert_eq!(
            "pending_delete".parse::<SyncState>().unwrap(),
            SyncState::PendingDelete
        );
        assert!("loud".parse::<Visibility>().is_err());
    }
}
