//! Database models
//!
//! Row structs for the cache tables and their conversion to domain items.
//! Timestamps are stored as fixed-width RFC 3339 text (UTC, microseconds) so
//! that string order in SQL is chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;
use std::collections::BTreeSet;

use crate::collection::{Item, SyncState, Visibility};
use crate::error::{AppError, Result};

/// A cached item row
#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub id: String,
    pub content: String,
    pub category: String,
    /// JSON array of tag labels
    pub tags_json: String,
    pub visibility: String,
    pub sync_state: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl TryFrom<ItemRow> for Item {
    type Error = AppError;

    fn try_from(row: ItemRow) -> Result<Self> {
        let tags: BTreeSet<String> = serde_json::from_str(&row.tags_json)?;

        Ok(Item {
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            tags,
            category: row.category.parse()?,
            content: row.content,
            visibility: row.visibility.parse::<Visibility>()?,
            sync_state: row.sync_state.parse::<SyncState>()?,
            id: row.id,
        })
    }
}

/// Convert a batch of rows, failing on the first malformed one
pub fn rows_to_items(rows: Vec<ItemRow>) -> Result<Vec<Item>> {
    rows.into_iter().map(Item::try_from).collect()
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| AppError::Validation(format!("invalid timestamp '{}': {}", text, e)))
}
