//! Synced collection controller
//!
//! Owns one collection of items and mediates between the local cache and the
//! remote service. All state lives on a [`SerialContext`]; cache and remote
//! calls run on the caller's task (or a spawned one) and re-enter the context
//! to apply their results. Observers read a [`CollectionSnapshot`] that is
//! recomputed after every state change.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::context::SerialContext;
use super::facet::{filter_by_selection, selection_predicate, Facet, Predicate};
use super::facet_index::{self, FacetCounts};
use super::item::SyncItem;
use super::ports::{LocalCache, RemoteService, SyncMarkerStore};
use super::projector::FilterSelection;
use super::search::{self, InputOutcome};
use super::state::{CollectionSnapshot, CollectionState};
use crate::config::CollectionConfig;
use crate::error::{AppError, Result};

pub(super) struct Shared<T: SyncItem, F: Facet> {
    pub(super) name: String,
    pub(super) ctx: SerialContext<CollectionState<T, F>>,
    pub(super) cache: Arc<dyn LocalCache<T>>,
    pub(super) remote: Arc<dyn RemoteService<T>>,
    pub(super) markers: Arc<dyn SyncMarkerStore>,
    pub(super) config: CollectionConfig,
    snapshots: watch::Receiver<CollectionSnapshot<T, F>>,
}

/// Handle to one synced collection. Cheap to clone; clones share state.
pub struct SyncedCollection<T: SyncItem, F: Facet> {
    pub(super) shared: Arc<Shared<T, F>>,
}

impl<T: SyncItem, F: Facet> Clone for SyncedCollection<T, F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: SyncItem, F: Facet> SyncedCollection<T, F> {
    /// Create a controller. Must be called inside a tokio runtime.
    pub fn new(
        name: impl Into<String>,
        cache: Arc<dyn LocalCache<T>>,
        remote: Arc<dyn RemoteService<T>>,
        markers: Arc<dyn SyncMarkerStore>,
        config: CollectionConfig,
    ) -> Self {
        let name = name.into();
        let state = CollectionState::new(config.page_size);
        let (tx, rx) = watch::channel(state.snapshot(0));

        let mut version = 0u64;
        let ctx = SerialContext::spawn(state, move |state: &CollectionState<T, F>| {
            version += 1;
            tx.send_replace(state.snapshot(version));
        });

        tracing::info!(
            "Collection '{}' ready (page size: {}, account: {})",
            name,
            config.page_size,
            config.account_id
        );

        Self {
            shared: Arc::new(Shared {
                name,
                ctx,
                cache,
                remote,
                markers,
                config,
                snapshots: rx,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.shared.config
    }

    /// Receiver that is notified after every state change
    pub fn subscribe(&self) -> watch::Receiver<CollectionSnapshot<T, F>> {
        self.shared.snapshots.clone()
    }

    /// The most recently published snapshot
    pub fn snapshot(&self) -> CollectionSnapshot<T, F> {
        self.shared.snapshots.borrow().clone()
    }

    /// Run `f` on the context, then schedule a facet count refresh if it
    /// touched anything the counts depend on
    pub(super) async fn apply<R, J>(&self, f: J) -> Result<R>
    where
        R: Send + 'static,
        J: FnOnce(&mut CollectionState<T, F>) -> R + Send + 'static,
    {
        let (result, refresh_facets) = self
            .shared
            .ctx
            .run(move |state| {
                let result = f(state);
                let refresh = state.take_facets_dirty() && begin_facet_refresh(state);
                (result, refresh)
            })
            .await?;

        if refresh_facets {
            self.spawn_facet_refresh();
        }
        Ok(result)
    }

    pub(super) async fn record_error(&self, err: &AppError) {
        let message = err.to_string();
        let _ = self
            .shared
            .ctx
            .run(move |state| state.error_message = Some(message))
            .await;
    }

    // ===== Loading =====

    /// Load the first page: cache first, then remote merged through the cache
    pub async fn load(&self) -> Result<()> {
        let started = self
            .apply(|state| {
                if state.is_loading {
                    return false;
                }
                state.is_loading = true;
                state.error_message = None;
                true
            })
            .await?;

        if !started {
            tracing::debug!("Load of '{}' already in flight", self.shared.name);
            return Ok(());
        }

        let page = self.shared.config.page_size;
        tracing::info!("Loading '{}' (page size: {})", self.shared.name, page);

        let cached = self.read_cache_with_timeout(page).await;
        if !cached.is_empty() {
            tracing::debug!("Publishing {} cached items for '{}'", cached.len(), self.shared.name);
            self.apply(move |state| state.replace_collection(cached, page))
                .await?;
        }

        let fetched = self.fetch_merged(page, 0).await;
        let name = self.shared.name.clone();
        let loaded = self
            .apply(move |state| {
                state.is_loading = false;
                match fetched {
                    Ok(items) => {
                        state.replace_collection(items, page);
                        state.loaded_once = true;
                        state.last_synced_at = Some(Instant::now());
                        tracing::info!(
                            "Loaded '{}': {} items (more pages: {})",
                            name,
                            state.collection.len(),
                            state.has_more_pages
                        );
                        Ok(())
                    }
                    Err(e) if state.collection.is_empty() => {
                        tracing::error!("Failed to load '{}': {}", name, e);
                        state.error_message = Some(e.to_string());
                        Err(e)
                    }
                    Err(e) => {
                        tracing::warn!("Remote fetch for '{}' failed, keeping cached items: {}", name, e);
                        Ok(())
                    }
                }
            })
            .await?;

        self.refresh_sources().await?;
        if loaded.is_ok() {
            self.spawn_full_sync();
        }
        loaded
    }

    /// Next unfiltered page. No-op while loading or when no pages remain.
    pub async fn load_more(&self) -> Result<()> {
        let offset = self
            .apply(|state| {
                if !state.has_more_pages || state.is_loading || state.is_loading_more {
                    return None;
                }
                state.is_loading_more = true;
                Some(state.offset)
            })
            .await?;

        let Some(offset) = offset else {
            return Ok(());
        };

        let page = self.shared.config.page_size;
        tracing::debug!("Loading more of '{}' at offset {}", self.shared.name, offset);
        let window = self.next_window(page, offset).await;

        let name = self.shared.name.clone();
        self.apply(move |state| {
            state.is_loading_more = false;
            match window {
                Ok(items) => {
                    let added = state.append_page(items);
                    tracing::debug!("Appended {} items to '{}'", added, name);
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!("Failed to load more of '{}': {}", name, e);
                    state.error_message = Some(e.to_string());
                    Err(e)
                }
            }
        })
        .await??;

        self.refresh_sources().await
    }

    /// Scroll-to-end: grow the display cap when filtering, otherwise page in more
    pub async fn show_more(&self) -> Result<()> {
        let grew = self
            .apply(|state| {
                if !state.filter.is_active() {
                    return false;
                }
                state.display_limit += state.page_size;
                true
            })
            .await?;

        if grew {
            Ok(())
        } else {
            self.load_more().await
        }
    }

    /// Background refresh. Returns whether a refresh ran; remote errors are
    /// logged and swallowed.
    pub async fn refresh_if_stale(&self) -> Result<bool> {
        let min_interval = self.shared.config.min_refresh_interval;
        let limit = self
            .apply(move |state| {
                let fresh = state
                    .last_synced_at
                    .map_or(false, |at| at.elapsed() < min_interval);
                if !state.active
                    || !state.loaded_once
                    || state.is_loading
                    || state.is_loading_more
                    || state.is_refreshing
                    || state.undo.is_pending()
                    || fresh
                {
                    return None;
                }
                state.is_refreshing = true;
                Some(state.page_size.max(state.collection.len()))
            })
            .await?;

        let Some(limit) = limit else {
            return Ok(false);
        };

        tracing::debug!("Refreshing '{}' (limit: {})", self.shared.name, limit);
        let fetched = self.fetch_merged(limit, 0).await;

        let name = self.shared.name.clone();
        let refreshed = self
            .apply(move |state| {
                state.is_refreshing = false;
                match fetched {
                    Ok(items) => {
                        state.replace_collection(items, limit);
                        state.last_synced_at = Some(Instant::now());
                        true
                    }
                    Err(e) => {
                        tracing::debug!("Background refresh of '{}' failed: {}", name, e);
                        false
                    }
                }
            })
            .await?;

        if refreshed {
            self.refresh_sources().await?;
        }
        Ok(refreshed)
    }

    /// Mark the view visible or hidden. Becoming visible refreshes if stale.
    pub async fn set_active(&self, active: bool) -> Result<()> {
        let activated = self
            .apply(move |state| {
                let was_active = state.active;
                state.active = active;
                active && !was_active && state.loaded_once
            })
            .await?;

        if activated {
            self.refresh_if_stale().await?;
        }
        Ok(())
    }

    /// One-time sweep of the whole remote collection into the cache.
    /// Returns whether a sweep ran.
    pub async fn full_sync_if_needed(&self) -> Result<bool> {
        let account = self.shared.config.account_id.clone();
        if self.shared.markers.is_full_sync_done(&account).await? {
            tracing::debug!("Full sync of '{}' already done for {}", self.shared.name, account);
            return Ok(false);
        }

        let started = self
            .shared
            .ctx
            .run(|state| !std::mem::replace(&mut state.full_sync_running, true))
            .await?;
        if !started {
            return Ok(false);
        }

        tracing::info!("Starting full sync of '{}' for {}", self.shared.name, account);
        let swept = self.sweep_remote().await;
        self.shared
            .ctx
            .run(|state| state.full_sync_running = false)
            .await?;

        let synced = swept?;
        self.shared.markers.mark_full_sync_done(&account).await?;
        tracing::info!("Full sync of '{}' complete: {} items", self.shared.name, synced);

        self.facet_counts().await?;
        self.refresh_sources().await?;
        Ok(true)
    }

    async fn sweep_remote(&self) -> Result<usize> {
        let batch = self.shared.config.full_sync_batch_size.max(1);
        let mut offset = 0;

        loop {
            let items = self.shared.remote.fetch_page(batch, offset).await?;
            let returned = items.len();
            self.shared.cache.upsert_many(&items).await?;
            offset += returned;
            tracing::debug!("Full sync of '{}': {} items so far", self.shared.name, offset);

            if returned < batch {
                return Ok(offset);
            }
        }
    }

    fn spawn_full_sync(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.full_sync_if_needed().await {
                tracing::warn!("Full sync of '{}' failed: {}", this.shared.name, e);
            }
        });
    }

    async fn read_cache_with_timeout(&self, limit: usize) -> Vec<T> {
        let timeout = self.shared.config.cache_read_timeout;
        match tokio::time::timeout(timeout, self.shared.cache.query(None, limit, 0)).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                tracing::warn!("Cache read for '{}' failed: {}", self.shared.name, e);
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    "Cache read for '{}' timed out after {:?}",
                    self.shared.name,
                    timeout
                );
                Vec::new()
            }
        }
    }

    /// Fetch from the remote, merge into the cache, and return the cache's view
    /// of the same window (or the raw remote items if the cache step fails)
    async fn fetch_merged(&self, limit: usize, offset: usize) -> Result<Vec<T>> {
        let remote_items = self.shared.remote.fetch_page(limit, offset).await?;

        match self.merge_into_cache(&remote_items, limit, offset).await {
            Ok(merged) => Ok(merged),
            Err(e) => {
                tracing::warn!(
                    "Cache merge for '{}' failed, using remote page: {}",
                    self.shared.name,
                    e
                );
                Ok(remote_items)
            }
        }
    }

    async fn merge_into_cache(&self, items: &[T], limit: usize, offset: usize) -> Result<Vec<T>> {
        self.shared.cache.upsert_many(items).await?;
        self.shared.cache.query(None, limit, offset).await
    }

    async fn next_window(&self, page: usize, offset: usize) -> Result<Vec<T>> {
        match self.shared.cache.query(None, page, offset).await {
            Ok(items) if items.len() >= page => return Ok(items),
            Ok(_) => {}
            Err(e) => tracing::warn!("Cache page read for '{}' failed: {}", self.shared.name, e),
        }
        self.fetch_merged(page, offset).await
    }

    // ===== Filtering and search =====

    /// Replace the whole filter selection
    pub async fn set_filter(&self, selection: FilterSelection<F>) -> Result<()> {
        self.set_selected_facets(selection.selected_facets).await?;
        self.set_search_text(selection.search_text).await
    }

    /// Change the selected facets and re-query the cache for matches
    pub async fn set_selected_facets(&self, facets: BTreeSet<F>) -> Result<()> {
        let predicate = selection_predicate(&facets);
        let filtering = predicate.is_some();

        let generation = self
            .apply(move |state| {
                state.filter.selected_facets = facets;
                state.filter_generation += 1;
                // Shown until the cache query answers
                state.filtered_from_cache =
                    filter_by_selection(&state.collection, &state.filter.selected_facets);
                state.is_filtering = filtering;
                state.reset_display_limit();
                state.filter_generation
            })
            .await?;

        match predicate {
            Some(predicate) => self.query_filtered(generation, predicate).await,
            None => Ok(()),
        }
    }

    async fn query_filtered(&self, generation: u64, predicate: Predicate) -> Result<()> {
        let limit = self.shared.config.query_limit;
        let result = self.shared.cache.query(Some(&predicate), limit, 0).await;

        let name = self.shared.name.clone();
        self.apply(move |state| {
            if state.filter_generation != generation {
                tracing::debug!("Dropping stale filter results for '{}'", name);
                return;
            }
            state.is_filtering = false;
            match result {
                Ok(items) => state.filtered_from_cache = state.without_pending(items),
                Err(e) => tracing::warn!("Filter query for '{}' failed, filtering loaded items: {}", name, e),
            }
        })
        .await
    }

    /// Re-derive the facet and search sources after the collection changed
    pub(super) async fn refresh_sources(&self) -> Result<()> {
        self.refresh_filtered_source().await?;
        self.refresh_search_results().await
    }

    async fn refresh_filtered_source(&self) -> Result<()> {
        let current = self
            .shared
            .ctx
            .run(|state| {
                let predicate = selection_predicate(&state.filter.selected_facets)?;
                state.filter_generation += 1;
                Some((state.filter_generation, predicate))
            })
            .await?;

        match current {
            Some((generation, predicate)) => self.query_filtered(generation, predicate).await,
            None => Ok(()),
        }
    }

    async fn refresh_search_results(&self) -> Result<()> {
        let current = self.apply(|state| state.search.rerun()).await?;

        match current {
            Some((generation, query)) => {
                tracing::debug!("Re-running search '{}' on '{}'", query, self.shared.name);
                self.search_and_apply(generation, query).await
            }
            None => Ok(()),
        }
    }

    /// Record a keystroke. The search itself runs once the input settles.
    pub async fn set_search_text(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        let input = text.clone();

        let outcome = self
            .apply(move |state| {
                let outcome = state.search.on_input(&input);
                if matches!(outcome, InputOutcome::Cleared) {
                    state.filter.search_text.clear();
                    state.search_results.clear();
                    state.reset_display_limit();
                }
                outcome
            })
            .await?;

        if let InputOutcome::Schedule(token) = outcome {
            let this = self.clone();
            tokio::spawn(async move { this.settle_search(text, token).await });
        }
        Ok(())
    }

    async fn settle_search(self, text: String, token: CancellationToken) {
        if !search::wait_for_quiet(&token, self.shared.config.search_debounce).await {
            return;
        }

        let settled = self
            .apply(move |state| {
                let generation = state.search.settle(&text)?;
                state.filter.search_text = state.search.settled_query().to_string();
                state.reset_display_limit();
                Some((generation, state.filter.search_text.clone()))
            })
            .await;

        let Ok(Some((generation, query))) = settled else {
            return;
        };

        tracing::debug!("Searching '{}' for '{}'", self.shared.name, query);
        let _ = self.search_and_apply(generation, query).await;
    }

    /// Run a search and publish its results unless a newer one superseded it
    async fn search_and_apply(&self, generation: u64, query: String) -> Result<()> {
        let results = self.run_search(&query).await;

        let name = self.shared.name.clone();
        self.apply(move |state| {
            if !state.search.is_current(generation) {
                tracing::debug!("Dropping superseded search results for '{}'", name);
                return;
            }
            state.search.finish(generation);
            state.search_results = state.without_pending(results);
        })
        .await
    }

    /// Cache search, then remote search, then a scan of the loaded items
    async fn run_search(&self, query: &str) -> Vec<T> {
        let limit = self.shared.config.query_limit;

        match self.shared.cache.search(query, limit).await {
            Ok(items) => return items,
            Err(e) => tracing::warn!("Cache search failed, trying remote: {}", e),
        }

        match self.shared.remote.search(query, 1, limit).await {
            Ok(items) => return items,
            Err(e) => tracing::warn!("Remote search failed, scanning loaded items: {}", e),
        }

        let needle = query.to_lowercase();
        self.shared
            .ctx
            .run(move |state| {
                state
                    .collection
                    .iter()
                    .filter(|item| item.content().to_lowercase().contains(&needle))
                    .cloned()
                    .collect()
            })
            .await
            .unwrap_or_default()
    }

    // ===== Facet counts =====

    /// Recount facets from the cache and publish the result
    pub async fn facet_counts(&self) -> Result<FacetCounts<F>> {
        let loaded = self
            .shared
            .ctx
            .run(|state| state.collection.clone())
            .await?;
        let counts: FacetCounts<F> = facet_index::facet_counts(self.shared.cache.as_ref(), &loaded).await;

        let published = counts.clone();
        self.shared
            .ctx
            .run(move |state| state.facet_counts = published)
            .await?;
        Ok(counts)
    }

    fn spawn_facet_refresh(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                if this.facet_counts().await.is_err() {
                    return;
                }
                let again = this
                    .shared
                    .ctx
                    .run(|state| {
                        if std::mem::take(&mut state.facet_refresh.rerun) {
                            true
                        } else {
                            state.facet_refresh.in_flight = false;
                            false
                        }
                    })
                    .await;
                if !matches!(again, Ok(true)) {
                    return;
                }
            }
        });
    }
}

/// Coalesce facet refreshes: at most one runs, and at most one more is queued
fn begin_facet_refresh<T: SyncItem, F: Facet>(state: &mut CollectionState<T, F>) -> bool {
    if state.facet_refresh.in_flight {
        state.facet_refresh.rerun = true;
        false
    } else {
        state.facet_refresh.in_flight = true;
        true
    }
}
