//! Application state and initialization
//!
//! This module wires settings, the local cache, the remote service and the
//! collection controllers together. All services are initialized here and
//! made available through AppState.

use crate::collection::{InMemoryCache, Item, ItemFacet, LocalCache, SyncMarkerStore, SyncedCollection};
use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::remote::HttpRemote;
use crate::services::{RefreshScheduler, Refreshable, SettingsService, SyncSettings};
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the memories collection (cache partition and REST resource)
pub const MEMORIES: &str = "memories";

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub app_data_dir: PathBuf,
    pub settings: SettingsService,
    pub sync_settings: SyncSettings,
    pub memories: SyncedCollection<Item, ItemFacet>,
    pub scheduler: Arc<RefreshScheduler>,
}

impl AppState {
    /// Initialize all services. Must be called inside a tokio runtime.
    pub async fn initialize(app_data_dir: PathBuf, api_token: Option<String>) -> Result<Self> {
        tracing::info!("Initializing application");
        tracing::info!("App data directory: {:?}", app_data_dir);

        std::fs::create_dir_all(&app_data_dir)?;

        let settings = SettingsService::new(app_data_dir.clone());
        let sync_settings = settings.load().await?.sync;

        let (cache, markers) = open_cache(&app_data_dir.join("localsync.db")).await;
        let remote = Arc::new(HttpRemote::new(&sync_settings.remote_base_url, MEMORIES, api_token)?);

        let memories = SyncedCollection::new(
            MEMORIES,
            cache,
            remote,
            markers,
            sync_settings.to_collection_config(),
        );

        let scheduler = Arc::new(RefreshScheduler::new().await?);
        let targets = vec![Arc::new(memories.clone()) as Arc<dyn Refreshable>];
        scheduler
            .schedule_refresh(sync_settings.cadence()?, targets)
            .await?;

        tracing::info!("Application initialized successfully");

        Ok(Self {
            app_data_dir,
            settings,
            sync_settings,
            memories,
            scheduler,
        })
    }
}

/// Open the SQLite cache, falling back to a process-local cache when the
/// database cannot be opened
async fn open_cache(db_path: &std::path::Path) -> (Arc<dyn LocalCache<Item>>, Arc<dyn SyncMarkerStore>) {
    match create_pool(db_path).await {
        Ok(pool) => {
            let repo = Arc::new(Repository::new(pool, MEMORIES));
            let cache: Arc<dyn LocalCache<Item>> = repo.clone();
            let markers: Arc<dyn SyncMarkerStore> = repo;
            (cache, markers)
        }
        Err(e) => {
            tracing::error!("Failed to open cache at {:?}, using in-memory cache: {}", db_path, e);
            let memory = Arc::new(InMemoryCache::<Item>::new());
            let cache: Arc<dyn LocalCache<Item>> = memory.clone();
            let markers: Arc<dyn SyncMarkerStore> = memory;
            (cache, markers)
        }
    }
}
