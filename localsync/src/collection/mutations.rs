//! Mutations
//!
//! Create and edit go to the remote service first. Visibility changes and
//! bulk operations write the cache first. Deletes wait out an undo window
//! before anything leaves the device.

use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

use super::controller::SyncedCollection;
use super::facet::Facet;
use super::item::{FieldUpdate, SyncItem, Visibility};
use super::undo::{tick_count, PendingDeletion, RemovedFrom};
use crate::error::{AppError, Result};

impl<T: SyncItem, F: Facet> SyncedCollection<T, F> {
    /// Create an item on the remote, cache it, and reload
    pub async fn create(&self, content: &str) -> Result<T> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("Content cannot be empty".to_string()));
        }

        tracing::info!("Creating item in '{}'", self.shared.name);

        let created = match self.shared.remote.create(content).await {
            Ok(item) => item,
            Err(e) => {
                let e = e.rejected("create");
                tracing::error!("Failed to create item in '{}': {}", self.shared.name, e);
                self.record_error(&e).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .shared
            .cache
            .upsert_many(std::slice::from_ref(&created))
            .await
        {
            tracing::warn!("Failed to cache created item {}: {}", created.id(), e);
        }

        if let Err(e) = self.load().await {
            tracing::warn!("Reload after create failed: {}", e);
        }

        // The reload, which also re-queries the filter sources, may have been
        // skipped if another load was in flight
        let inserted = created.clone();
        self.apply(move |state| state.insert(inserted)).await?;

        tracing::info!("Item created successfully: {}", created.id());
        Ok(created)
    }

    /// Replace an item's content. The remote is updated before anything local.
    pub async fn edit(&self, id: &str, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("Content cannot be empty".to_string()));
        }

        tracing::debug!("Editing item: {}", id);

        if let Err(e) = self.shared.remote.update_content(id, content).await {
            let e = e.rejected("edit");
            tracing::error!("Failed to edit item {}: {}", id, e);
            self.record_error(&e).await;
            return Err(e);
        }

        let update = FieldUpdate::Content(content.to_string());
        if let Err(e) = self.shared.cache.update_field(id, &update).await {
            tracing::warn!("Failed to update cached item {}: {}", id, e);
        }

        let id = id.to_string();
        self.apply(move |state| {
            state.update_everywhere(&id, |item| update.apply_to(item));
        })
        .await?;

        Ok(())
    }

    /// Flip between private and public. Returns the new visibility.
    ///
    /// The cache is written first. If the remote rejects the change only the
    /// in-memory copies are reverted, so the cache keeps the new value until
    /// the next sync overwrites it; a later refresh can show it again.
    pub async fn toggle_visibility(&self, id: &str) -> Result<Visibility> {
        let lookup = id.to_string();
        let current = self
            .shared
            .ctx
            .run(move |state| state.find(&lookup).map(|item| item.visibility()))
            .await?
            .ok_or_else(|| AppError::ItemNotFound(id.to_string()))?;
        let next = current.toggled();

        tracing::debug!("Setting visibility of {} to {}", id, next.as_str());

        let update = FieldUpdate::Visibility(next);
        if let Err(e) = self.shared.cache.update_field(id, &update).await {
            tracing::warn!("Failed to update cached visibility of {}: {}", id, e);
        }

        let target = id.to_string();
        self.apply(move |state| {
            state.update_everywhere(&target, |item| update.apply_to(item));
        })
        .await?;

        if let Err(e) = self.shared.remote.update_visibility(id, next).await {
            let e = e.rejected("visibility");
            tracing::error!("Failed to change visibility of {}: {}", id, e);

            // The cache keeps the new value
            let target = id.to_string();
            let message = e.to_string();
            self.apply(move |state| {
                state.update_everywhere(&target, |item| item.set_visibility(current));
                state.error_message = Some(message);
            })
            .await?;
            return Err(e);
        }

        Ok(next)
    }

    // ===== Delete with undo =====

    /// Hide an item and start its undo window. A deletion already waiting is
    /// committed first.
    pub async fn request_delete(&self, id: &str) -> Result<()> {
        let window = self.shared.config.undo_window;
        let target = id.to_string();

        let previous = self
            .apply(move |state| {
                state.find(&target)?;
                Some(state.undo.take())
            })
            .await?;

        let Some(previous) = previous else {
            return Err(AppError::ItemNotFound(id.to_string()));
        };

        if let Some(previous) = previous {
            self.commit_earlier(previous).await;
        }

        let target = id.to_string();
        let begun = self
            .apply(move |state| {
                let (item, removed_from) = state.remove_everywhere(&target)?;
                Some(state.undo.begin(item, removed_from, window))
            })
            .await?;

        let Some((replaced, ticket, token)) = begun else {
            return Err(AppError::ItemNotFound(id.to_string()));
        };

        tracing::info!("Deleting item {} in {:?} unless undone", id, window);
        self.spawn_countdown(ticket, token);

        // Another request may have filled the slot while the earlier commit ran
        if let Some(replaced) = replaced {
            self.commit_earlier(replaced).await;
        }

        Ok(())
    }

    async fn commit_earlier(&self, previous: PendingDeletion<T>) {
        tracing::debug!("Committing earlier deletion of {}", previous.item.id());
        if let Err(e) = self.commit_delete(previous.item, previous.removed_from).await {
            tracing::warn!("Earlier deletion failed: {}", e);
        }
    }

    /// Restore the pending deletion. Returns whether anything was pending.
    pub async fn undo_delete(&self) -> Result<bool> {
        let restored = self
            .apply(|state| {
                let pending = state.undo.take()?;
                let id = pending.item.id().to_string();
                state.restore(pending.item, pending.removed_from);
                Some(id)
            })
            .await?;

        match restored {
            Some(id) => {
                tracing::info!("Undid deletion of {}", id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Commit the pending deletion without waiting for the window to expire
    pub async fn confirm_delete_now(&self) -> Result<bool> {
        let pending = self.apply(|state| state.undo.take()).await?;

        match pending {
            Some(pending) => {
                self.commit_delete(pending.item, pending.removed_from).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn spawn_countdown(&self, ticket: u64, token: CancellationToken) {
        let this = self.clone();
        let tick = self.shared.config.undo_tick;
        let ticks = tick_count(self.shared.config.undo_window, tick);

        tokio::spawn(async move {
            for _ in 0..ticks {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(tick) => {}
                }
                let ticked = this
                    .shared
                    .ctx
                    .run(move |state| state.undo.tick(ticket, tick))
                    .await;
                if ticked.is_err() {
                    return;
                }
            }

            if token.is_cancelled() {
                return;
            }

            let expired = this.apply(move |state| state.undo.take_ticket(ticket)).await;
            if let Ok(Some(pending)) = expired {
                if let Err(e) = this.commit_delete(pending.item, pending.removed_from).await {
                    tracing::warn!("Deletion failed after undo window: {}", e);
                }
            }
        });
    }

    /// Soft-delete in the cache, then delete remotely. A remote failure puts
    /// the item back in memory; the cache tombstone stays.
    async fn commit_delete(&self, item: T, removed_from: RemovedFrom) -> Result<()> {
        let id = item.id().to_string();

        if let Err(e) = self.shared.cache.soft_delete(&id).await {
            tracing::warn!("Failed to soft-delete cached item {}: {}", id, e);
        }

        match self.shared.remote.delete(&id).await {
            Ok(()) => {
                tracing::info!("Item deleted successfully: {}", id);
                self.apply(|state| state.mark_facets_dirty()).await?;
                Ok(())
            }
            Err(e) => {
                let e = e.rejected("delete");
                tracing::error!("Failed to delete item {}: {}", id, e);

                let message = e.to_string();
                self.apply(move |state| {
                    let lists = if removed_from.any() {
                        removed_from
                    } else {
                        RemovedFrom {
                            collection: true,
                            ..RemovedFrom::default()
                        }
                    };
                    state.restore(item, lists);
                    state.error_message = Some(message);
                })
                .await?;
                Err(e)
            }
        }
    }

    // ===== Bulk operations =====

    /// Delete every item: cache first, then one remote call, then reload
    pub async fn delete_all(&self) -> Result<()> {
        let Some(ids) = self.begin_bulk().await? else {
            return Ok(());
        };

        tracing::info!("Deleting all {} known items in '{}'", ids.len(), self.shared.name);

        for id in &ids {
            if let Err(e) = self.shared.cache.soft_delete(id).await {
                tracing::debug!("Skipping cache delete of {}: {}", id, e);
            }
        }
        self.apply(|state| state.clear_items()).await?;

        let result = self
            .shared
            .remote
            .delete_all()
            .await
            .map_err(|e| e.rejected("delete all"));
        self.finish_bulk(result).await
    }

    /// Set every item's visibility: cache first, then one remote call, then reload
    pub async fn set_all_visibility(&self, visibility: Visibility) -> Result<()> {
        let Some(ids) = self.begin_bulk().await? else {
            return Ok(());
        };

        tracing::info!(
            "Setting visibility of {} known items in '{}' to {}",
            ids.len(),
            self.shared.name,
            visibility.as_str()
        );

        let update = FieldUpdate::Visibility(visibility);
        for id in &ids {
            if let Err(e) = self.shared.cache.update_field(id, &update).await {
                tracing::debug!("Skipping cache update of {}: {}", id, e);
            }
        }
        self.apply(move |state| {
            for id in &ids {
                state.update_everywhere(id, |item| update.apply_to(item));
            }
        })
        .await?;

        let result = self
            .shared
            .remote
            .set_all_visibility(visibility)
            .await
            .map_err(|e| e.rejected("set all visibility"));
        self.finish_bulk(result).await
    }

    /// Mark a bulk operation running and collect every known id: loaded,
    /// searched, filtered, pending, and whatever the cache holds
    async fn begin_bulk(&self) -> Result<Option<Vec<String>>> {
        let known = self
            .apply(|state| {
                if state.is_bulk_operation {
                    return None;
                }
                state.is_bulk_operation = true;
                let ids = state.known_ids();
                // The pending item is covered by the bulk call
                state.undo.take();
                Some(ids)
            })
            .await?;

        let Some(known) = known else {
            tracing::debug!("Bulk operation on '{}' already running", self.shared.name);
            return Ok(None);
        };

        let mut ids: BTreeSet<String> = known.into_iter().collect();
        match self
            .shared
            .cache
            .query(None, self.shared.config.query_limit, 0)
            .await
        {
            Ok(cached) => ids.extend(cached.iter().map(|item| item.id().to_string())),
            Err(e) => tracing::warn!("Could not list cached items: {}", e),
        }

        Ok(Some(ids.into_iter().collect()))
    }

    async fn finish_bulk(&self, result: Result<()>) -> Result<()> {
        if let Err(e) = &result {
            tracing::error!("Bulk operation on '{}' failed: {}", self.shared.name, e);
        }

        self.apply(|state| state.is_bulk_operation = false).await?;

        if let Err(e) = self.load().await {
            tracing::warn!("Reload after bulk operation failed: {}", e);
        }

        if let Err(e) = &result {
            self.record_error(e).await;
        }
        result
    }
}
