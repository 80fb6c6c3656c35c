//! Repository layer for the SQLite cache
//!
//! One repository serves one collection (rows are keyed by collection name)
//! and implements both the cache port and the full-sync marker store.
//! Multi-row writes run in a transaction.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::models::{format_timestamp, rows_to_items, ItemRow};
use super::query::{compile, like_pattern};
use crate::collection::{FieldUpdate, Item, LocalCache, Predicate, SyncMarkerStore};
use crate::error::{AppError, Result};

const ITEM_COLUMNS: &str =
    "id, content, category, tags_json, visibility, sync_state, created_at, updated_at, deleted_at";

/// SQLite cache for one collection
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    collection: String,
}

impl Repository {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Get/set settings
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Set setting: {} = {}", key, value);
        Ok(())
    }

    fn marker_key(&self, account: &str) -> String {
        format!("full_sync_done:{}:{}", self.collection, account)
    }

    /// Live rows, optionally narrowed by a predicate, newest first
    async fn select_live(&self, filter: Option<&Predicate>, limit: usize, offset: usize) -> Result<Vec<Item>> {
        let mut sql = format!(
            "SELECT {} FROM items WHERE collection = ? AND deleted_at IS NULL",
            ITEM_COLUMNS
        );
        let condition = filter.map(compile);
        if let Some(condition) = &condition {
            sql.push_str(" AND ");
            sql.push_str(&condition.sql);
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, ItemRow>(&sql).bind(&self.collection);
        if let Some(condition) = &condition {
            for value in &condition.binds {
                query = query.bind(value);
            }
        }

        let rows = query
            .bind(to_sql_int(limit))
            .bind(to_sql_int(offset))
            .fetch_all(&self.pool)
            .await?;

        rows_to_items(rows)
    }
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl LocalCache<Item> for Repository {
    async fn query(&self, filter: Option<&Predicate>, limit: usize, offset: usize) -> Result<Vec<Item>> {
        self.select_live(filter, limit, offset).await
    }

    async fn count(&self, filter: Option<&Predicate>) -> Result<usize> {
        let mut sql = "SELECT COUNT(*) FROM items WHERE collection = ? AND deleted_at IS NULL".to_string();
        let condition = filter.map(compile);
        if let Some(condition) = &condition {
            sql.push_str(" AND ");
            sql.push_str(&condition.sql);
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(&self.collection);
        if let Some(condition) = &condition {
            for value in &condition.binds {
                query = query.bind(value);
            }
        }

        let count = query.fetch_one(&self.pool).await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Item>> {
        let sql = format!(
            r#"
            SELECT {} FROM items
            WHERE collection = ? AND deleted_at IS NULL AND content LIKE ? ESCAPE '\'
            ORDER BY created_at DESC, id ASC
            LIMIT ?
            "#,
            ITEM_COLUMNS
        );

        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(&self.collection)
            .bind(like_pattern(text))
            .bind(to_sql_int(limit))
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!("Cache search '{}' matched {} items", text, rows.len());
        rows_to_items(rows)
    }

    async fn upsert_many(&self, items: &[Item]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for item in items {
            let tags_json = serde_json::to_string(&item.tags)?;

            // Keep the local copy when it is newer; a tombstone only yields to a later update
            let result = sqlx::query(
                r#"
                INSERT INTO items (collection, id, content, category, tags_json, visibility,
                                   sync_state, created_at, updated_at, deleted_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
                ON CONFLICT(collection, id) DO UPDATE SET
                    content = excluded.content,
                    category = excluded.category,
                    tags_json = excluded.tags_json,
                    visibility = excluded.visibility,
                    sync_state = excluded.sync_state,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    deleted_at = NULL
                WHERE (items.deleted_at IS NULL AND excluded.updated_at >= items.updated_at)
                   OR (items.deleted_at IS NOT NULL AND excluded.updated_at > items.deleted_at)
                "#,
            )
            .bind(&self.collection)
            .bind(&item.id)
            .bind(&item.content)
            .bind(item.category.as_str())
            .bind(&tags_json)
            .bind(item.visibility.as_str())
            .bind(item.sync_state.as_str())
            .bind(format_timestamp(item.created_at))
            .bind(format_timestamp(item.updated_at))
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected();
        }

        tx.commit().await?;

        tracing::debug!(
            "Cached {} of {} items in '{}' (skipped {} newer local)",
            written,
            items.len(),
            self.collection,
            items.len() as u64 - written
        );
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE items SET deleted_at = ?
            WHERE collection = ? AND id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(format_timestamp(Utc::now()))
        .bind(&self.collection)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::ItemNotFound(id.to_string()));
        }

        tracing::debug!("Soft-deleted cached item: {}", id);
        Ok(())
    }

    async fn update_field(&self, id: &str, update: &FieldUpdate) -> Result<()> {
        let (column, value) = match update {
            FieldUpdate::Content(content) => ("content", content.clone()),
            FieldUpdate::Visibility(visibility) => ("visibility", visibility.as_str().to_string()),
        };

        let sql = format!(
            "UPDATE items SET {} = ?, updated_at = ? WHERE collection = ? AND id = ? AND deleted_at IS NULL",
            column
        );
        let rows = sqlx::query(&sql)
            .bind(value)
            .bind(format_timestamp(Utc::now()))
            .bind(&self.collection)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::ItemNotFound(id.to_string()));
        }

        tracing::debug!("Updated {} of cached item: {}", column, id);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Item>> {
        let sql = format!(
            "SELECT {} FROM items WHERE collection = ? AND id = ? AND deleted_at IS NULL",
            ITEM_COLUMNS
        );
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(&self.collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Item::try_from).transpose()
    }
}

#[async_trait]
impl SyncMarkerStore for Repository {
    async fn is_full_sync_done(&self, account: &str) -> Result<bool> {
        Ok(self
            .get_setting(&self.marker_key(account))
            .await?
            .is_some_and(|value| value == "true"))
    }

    async fn mark_full_sync_done(&self, account: &str) -> Result<()> {
        self.set_setting(&self.marker_key(account), "true").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::facet_index::{count_from_cache, count_in_memory, FacetCounts};
    use crate::collection::{Category, Facet, ItemFacet, SyncItem, SyncState, Visibility};
    use crate::database::schema::initialize_database;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_repo() -> Repository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        initialize_database(&pool).await.unwrap();

        Repository::new(pool, "memories")
    }

    fn create_test_item(id: &str, minutes_ago: i64, category: Category, tags: &[&str]) -> Item {
        let mut item = Item::new_local(format!("Memory {}", id), category).with_tags(tags.iter().copied());
        item.id = id.to_string();
        item.created_at = Utc::now() - Duration::minutes(minutes_ago);
        item.updated_at = item.created_at;
        item.sync_state = SyncState::Synced;
        item
    }

    #[tokio::test]
    async fn test_upsert_and_query_newest_first() {
        let repo = create_test_repo().await;
        let items = vec![
            create_test_item("old", 30, Category::Manual, &[]),
            create_test_item("new", 1, Category::Manual, &["health"]),
        ];

        repo.upsert_many(&items).await.unwrap();

        let page = repo.query(None, 10, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "new");
        assert!(page[0].has_tag("health"));

        let second = repo.query(None, 1, 1).await.unwrap();
        assert_eq!(second[0].id, "old");
    }

    #[tokio::test]
    async fn test_upsert_keeps_newer_local_copy() {
        let repo = create_test_repo().await;
        let item = create_test_item("m1", 5, Category::Manual, &[]);
        repo.upsert_many(&[item.clone()]).await.unwrap();

        repo.update_field("m1", &FieldUpdate::Content("edited".to_string()))
            .await
            .unwrap();
        repo.upsert_many(&[item]).await.unwrap();

        let cached = repo.get_by_id("m1").await.unwrap().unwrap();
        assert_eq!(cached.content, "edited");
    }

    #[tokio::test]
    async fn test_tombstone_yields_only_to_later_update() {
        let repo = create_test_repo().await;
        let mut item = create_test_item("m1", 5, Category::Manual, &[]);
        repo.upsert_many(&[item.clone()]).await.unwrap();
        repo.soft_delete("m1").await.unwrap();

        repo.upsert_many(&[item.clone()]).await.unwrap();
        assert!(repo.get_by_id("m1").await.unwrap().is_none());

        item.updated_at = Utc::now() + Duration::seconds(5);
        repo.upsert_many(&[item]).await.unwrap();
        assert!(repo.get_by_id("m1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_soft_delete_missing_item() {
        let repo = create_test_repo().await;
        let result = repo.soft_delete("nope").await;
        assert!(matches!(result, Err(AppError::ItemNotFound(_))));
    }

    #[tokio::test]
    async fn test_facet_query_matches_in_memory_predicate() {
        let repo = create_test_repo().await;
        let items = vec![
            create_test_item("sys", 1, Category::System, &[]),
            create_test_item("sys-tip", 2, Category::System, &["tips"]),
            create_test_item("sys-focus", 3, Category::System, &["focus", "focused"]),
            create_test_item("manual", 4, Category::Manual, &["tipsy"]),
            create_test_item("interesting", 5, Category::Interesting, &["learning"]),
        ];
        repo.upsert_many(&items).await.unwrap();

        for facet in ItemFacet::all() {
            let predicate = facet.predicate();
            let from_sql: Vec<String> = repo
                .query(Some(&predicate), 100, 0)
                .await
                .unwrap()
                .into_iter()
                .map(|item| item.id)
                .collect();
            let in_memory: Vec<String> = items
                .iter()
                .filter(|item| predicate.matches(*item))
                .map(|item| item.id.clone())
                .collect();
            assert_eq!(from_sql, in_memory, "facet {:?}", facet);
        }

        let counts: FacetCounts<ItemFacet> = count_from_cache::<Item, ItemFacet>(&repo).await.unwrap();
        let approximate: FacetCounts<ItemFacet> = count_in_memory(&items);
        assert_eq!(counts.per_facet, approximate.per_facet);
        assert_eq!(counts.get(ItemFacet::Tips), 1);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_literal() {
        let repo = create_test_repo().await;
        let mut discount = create_test_item("d", 1, Category::Manual, &[]);
        discount.content = "Grab the 50% OFF coupon".to_string();
        let plain = create_test_item("p", 2, Category::Manual, &[]);
        repo.upsert_many(&[discount, plain]).await.unwrap();

        let hits = repo.search("50% off", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "d");

        assert!(repo.search("5_%", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_visibility_field() {
        let repo = create_test_repo().await;
        repo.upsert_many(&[create_test_item("m1", 1, Category::Manual, &[])])
            .await
            .unwrap();

        repo.update_field("m1", &FieldUpdate::Visibility(Visibility::Public))
            .await
            .unwrap();

        let cached = repo.get_by_id("m1").await.unwrap().unwrap();
        assert_eq!(cached.visibility, Visibility::Public);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let repo = create_test_repo().await;
        let tasks = Repository::new(repo.pool.clone(), "tasks");
        repo.upsert_many(&[create_test_item("m1", 1, Category::Manual, &[])])
            .await
            .unwrap();

        assert_eq!(repo.count(None).await.unwrap(), 1);
        assert_eq!(tasks.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_sync_markers() {
        let repo = create_test_repo().await;

        assert!(!repo.is_full_sync_done("alice").await.unwrap());
        repo.mark_full_sync_done("alice").await.unwrap();
        assert!(repo.is_full_sync_done("alice").await.unwrap());
        assert!(!repo.is_full_sync_done("bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_settings() {
        let repo = create_test_repo().await;

        assert!(repo.get_setting("theme").await.unwrap().is_none());
        repo.set_setting("theme", "dark").await.unwrap();
        repo.set_setting("theme", "light").await.unwrap();
        assert_eq!(repo.get_setting("theme").await.unwrap().as_deref(), Some("light"));
    }
}
