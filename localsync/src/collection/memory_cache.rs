//! In-memory cache
//!
//! A [`LocalCache`] kept entirely in process memory. Used when the SQLite
//! cache cannot be opened, and by tests. Follows the same merge and tombstone
//! rules as the SQLite repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::facet::Predicate;
use super::item::{sort_newest_first, FieldUpdate, SyncItem};
use super::ports::{LocalCache, SyncMarkerStore};
use crate::error::{AppError, Result};

struct Entry<T> {
    item: T,
    deleted_at: Option<DateTime<Utc>>,
}

struct Inner<T> {
    entries: HashMap<String, Entry<T>>,
    markers: HashSet<String>,
}

pub struct InMemoryCache<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: SyncItem> Default for InMemoryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SyncItem> InMemoryCache<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                markers: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner<T>>> {
        self.inner
            .lock()
            .map_err(|_| AppError::CacheUnavailable("in-memory cache lock poisoned".to_string()))
    }

    fn live_sorted(&self, keep: impl Fn(&T) -> bool) -> Result<Vec<T>> {
        let inner = self.lock()?;
        let mut items: Vec<T> = inner
            .entries
            .values()
            .filter(|entry| entry.deleted_at.is_none() && keep(&entry.item))
            .map(|entry| entry.item.clone())
            .collect();
        sort_newest_first(&mut items);
        Ok(items)
    }
}

#[async_trait]
impl<T: SyncItem> LocalCache<T> for InMemoryCache<T> {
    async fn query(&self, filter: Option<&Predicate>, limit: usize, offset: usize) -> Result<Vec<T>> {
        let items = self.live_sorted(|item| filter.map_or(true, |p| p.matches(item)))?;
        Ok(items.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, filter: Option<&Predicate>) -> Result<usize> {
        Ok(self
            .live_sorted(|item| filter.map_or(true, |p| p.matches(item)))?
            .len())
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<T>> {
        let needle = text.to_lowercase();
        let items = self.live_sorted(|item| item.content().to_lowercase().contains(&needle))?;
        Ok(items.into_iter().take(limit).collect())
    }

    async fn upsert_many(&self, items: &[T]) -> Result<()> {
        let mut inner = self.lock()?;
        let mut skipped = 0;

        for item in items {
            match inner.entries.get_mut(item.id()) {
                Some(entry) => {
                    let newer_than_local = match entry.deleted_at {
                        Some(deleted_at) => item.updated_at() > deleted_at,
                        None => item.updated_at() >= entry.item.updated_at(),
                    };
                    if newer_than_local {
                        entry.item = item.clone();
                        entry.deleted_at = None;
                    } else {
                        skipped += 1;
                    }
                }
                None => {
                    inner.entries.insert(
                        item.id().to_string(),
                        Entry {
                            item: item.clone(),
                            deleted_at: None,
                        },
                    );
                }
            }
        }

        tracing::debug!(
            "In-memory cache merged {} items (skipped {} newer local)",
            items.len() - skipped,
            skipped
        );
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.entries.get_mut(id) {
            Some(entry) if entry.deleted_at.is_none() => {
                entry.deleted_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(AppError::ItemNotFound(id.to_string())),
        }
    }

    async fn update_field(&self, id: &str, update: &FieldUpdate) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.entries.get_mut(id) {
            Some(entry) if entry.deleted_at.is_none() => {
                update.apply_to(&mut entry.item);
                Ok(())
            }
            _ => Err(AppError::ItemNotFound(id.to_string())),
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>> {
        let inner = self.lock()?;
        Ok(inner
            .entries
            .get(id)
            .filter(|entry| entry.deleted_at.is_none())
            .map(|entry| entry.item.clone()))
    }
}

#[async_trait]
impl<T: SyncItem> SyncMarkerStore for InMemoryCache<T> {
    async fn is_full_sync_done(&self, account: &str) -> Result<bool> {
        Ok(self.lock()?.markers.contains(account))
    }

    async fn mark_full_sync_done(&self, account: &str) -> Result<()> {
        self.lock()?.markers.insert(account.to_string());
        Ok(())
    }
}
