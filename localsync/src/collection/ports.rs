//! Store interfaces injected into every controller
//!
//! Implementations are shared between controllers (one per collection type)
//! and must be safe for concurrent use.

use async_trait::async_trait;

use super::facet::Predicate;
use super::item::{FieldUpdate, SyncItem, Visibility};
use crate::error::Result;

/// Durable local store of items
#[async_trait]
pub trait LocalCache<T: SyncItem>: Send + Sync {
    /// Live items matching `filter`, newest first
    async fn query(&self, filter: Option<&Predicate>, limit: usize, offset: usize) -> Result<Vec<T>>;

    async fn count(&self, filter: Option<&Predicate>) -> Result<usize>;

    /// Case-insensitive content search, newest first
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<T>>;

    /// Merge items by id
    async fn upsert_many(&self, items: &[T]) -> Result<()>;

    async fn soft_delete(&self, id: &str) -> Result<()>;

    async fn update_field(&self, id: &str, update: &FieldUpdate) -> Result<()>;

    async fn get_by_id(&self, id: &str) -> Result<Option<T>>;
}

/// The authoritative API
#[async_trait]
pub trait RemoteService<T: SyncItem>: Send + Sync {
    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<T>>;

    async fn create(&self, content: &str) -> Result<T>;

    async fn update_content(&self, id: &str, content: &str) -> Result<()>;

    async fn update_visibility(&self, id: &str, visibility: Visibility) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn delete_all(&self) -> Result<()>;

    async fn set_all_visibility(&self, visibility: Visibility) -> Result<()>;

    async fn search(&self, text: &str, page: usize, per_page: usize) -> Result<Vec<T>>;
}

/// Persisted per-account record of a completed full sync sweep
#[async_trait]
pub trait SyncMarkerStore: Send + Sync {
    async fn is_full_sync_done(&self, account: &str) -> Result<bool>;

    async fn mark_full_sync_done(&self, account: &str) -> Result<()>;
}
