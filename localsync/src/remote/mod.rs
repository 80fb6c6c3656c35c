//! Remote service adapters
//!
//! The HTTP adapter talks JSON to the authoritative REST API. Wire types live
//! here and are converted to collection items at the boundary.

pub mod http;

pub use http::HttpRemote;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collection::{Category, Item, SyncState, Visibility};

/// An item as the remote API returns it
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    pub content: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<RemoteItem> for Item {
    fn from(remote: RemoteItem) -> Self {
        Item {
            id: remote.id,
            created_at: remote.created_at,
            updated_at: remote.updated_at,
            tags: remote.tags.into_iter().collect(),
            category: remote.category,
            content: remote.content,
            visibility: remote.visibility,
            sync_state: SyncState::Synced,
        }
    }
}

/// Body of a create request
#[derive(Debug, Serialize)]
pub struct CreateRequest<'a> {
    pub content: &'a str,
    pub visibility: Visibility,
    pub category: Category,
}

/// Response to a create request
#[derive(Debug, Deserialize)]
pub struct CreateResponse {
    pub id: String,
}

/// Body of single-value updates (content, visibility)
#[derive(Debug, Serialize)]
pub struct ValueRequest<'a> {
    pub value: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_item_converts_with_defaults() {
        let json = r#"{
            "id": "m-1",
            "content": "Prefers tea over coffee",
            "category": "interesting",
            "created_at": "2024-05-01T08:00:00Z",
            "updated_at": "2024-05-02T08:00:00Z",
            "tags": ["health", "tips"],
            "reviewed": false
        }"#;

        let remote: RemoteItem = serde_json::from_str(json).unwrap();
        let item = Item::from(remote);

        assert_eq!(item.category, Category::Interesting);
        assert_eq!(item.visibility, Visibility::Private);
        assert_eq!(item.sync_state, SyncState::Synced);
        assert!(item.tags.contains("tips"));
    }
}
