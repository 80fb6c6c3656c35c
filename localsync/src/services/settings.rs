//! Settings service
//!
//! Persists controller tuning as JSON in the app data directory.

use crate::config::{
    CollectionConfig, ANONYMOUS_ACCOUNT, DEFAULT_CACHE_READ_TIMEOUT_MS, DEFAULT_MIN_REFRESH_INTERVAL_SECS,
    DEFAULT_PAGE_SIZE, DEFAULT_REFRESH_CADENCE, DEFAULT_SEARCH_DEBOUNCE_MS, DEFAULT_UNDO_WINDOW_MS,
    MAX_PAGE_SIZE, MAX_SEARCH_DEBOUNCE_MS, MAX_UNDO_WINDOW_MS, MIN_PAGE_SIZE, MIN_SEARCH_DEBOUNCE_MS,
    UNDO_TICK_MS,
};
use crate::error::{AppError, Result};
use crate::services::scheduler::RefreshCadence;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Synchronization tuning shared by every collection controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Quiet period before a typed search query runs
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
    #[serde(default = "default_undo_window_ms")]
    pub undo_window_ms: u64,
    /// Background refresh cadence: "30s", "5m", "1h"
    #[serde(default = "default_refresh_cadence")]
    pub refresh_cadence: String,
    #[serde(default = "default_cache_read_timeout_ms")]
    pub cache_read_timeout_ms: u64,
    #[serde(default = "default_min_refresh_interval_secs")]
    pub min_refresh_interval_secs: u64,
    #[serde(default = "default_account_id")]
    pub account_id: String,
    #[serde(default = "default_remote_base_url")]
    pub remote_base_url: String,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_search_debounce_ms() -> u64 {
    DEFAULT_SEARCH_DEBOUNCE_MS
}

fn default_undo_window_ms() -> u64 {
    DEFAULT_UNDO_WINDOW_MS
}

fn default_refresh_cadence() -> String {
    DEFAULT_REFRESH_CADENCE.to_string()
}

fn default_cache_read_timeout_ms() -> u64 {
    DEFAULT_CACHE_READ_TIMEOUT_MS
}

fn default_min_refresh_interval_secs() -> u64 {
    DEFAULT_MIN_REFRESH_INTERVAL_SECS
}

fn default_account_id() -> String {
    ANONYMOUS_ACCOUNT.to_string()
}

fn default_remote_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            search_debounce_ms: default_search_debounce_ms(),
            undo_window_ms: default_undo_window_ms(),
            refresh_cadence: default_refresh_cadence(),
            cache_read_timeout_ms: default_cache_read_timeout_ms(),
            min_refresh_interval_secs: default_min_refresh_interval_secs(),
            account_id: default_account_id(),
            remote_base_url: default_remote_base_url(),
        }
    }
}

impl SyncSettings {
    /// Check every value against the configured bounds
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(AppError::Validation(format!(
                "Page size must be between {} and {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }

        if !(MIN_SEARCH_DEBOUNCE_MS..=MAX_SEARCH_DEBOUNCE_MS).contains(&self.search_debounce_ms) {
            return Err(AppError::Validation(format!(
                "Search debounce must be between {}ms and {}ms",
                MIN_SEARCH_DEBOUNCE_MS, MAX_SEARCH_DEBOUNCE_MS
            )));
        }

        if !(UNDO_TICK_MS..=MAX_UNDO_WINDOW_MS).contains(&self.undo_window_ms) {
            return Err(AppError::Validation(format!(
                "Undo window must be between {}ms and {}ms",
                UNDO_TICK_MS, MAX_UNDO_WINDOW_MS
            )));
        }

        if self.cache_read_timeout_ms == 0 {
            return Err(AppError::Validation(
                "Cache read timeout must be greater than zero".to_string(),
            ));
        }

        if self.account_id.trim().is_empty() {
            return Err(AppError::Validation("Account id cannot be empty".to_string()));
        }

        if !(self.remote_base_url.starts_with("http://") || self.remote_base_url.starts_with("https://")) {
            return Err(AppError::Validation(format!(
                "Remote base URL must start with http:// or https://: {}",
                self.remote_base_url
            )));
        }

        self.cadence()?;
        Ok(())
    }

    pub fn cadence(&self) -> Result<RefreshCadence> {
        self.refresh_cadence.parse().map_err(AppError::Validation)
    }

    /// Runtime configuration for a controller built from these settings
    pub fn to_collection_config(&self) -> CollectionConfig {
        CollectionConfig {
            page_size: self.page_size,
            cache_read_timeout: Duration::from_millis(self.cache_read_timeout_ms),
            search_debounce: Duration::from_millis(self.search_debounce_ms),
            undo_window: Duration::from_millis(self.undo_window_ms),
            min_refresh_interval: Duration::from_secs(self.min_refresh_interval_secs),
            account_id: self.account_id.clone(),
            ..CollectionConfig::default()
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Service for managing application settings
#[derive(Clone)]
pub struct SettingsService {
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new(app_data_dir: PathBuf) -> Self {
        Self {
            settings_path: app_data_dir.join("settings.json"),
        }
    }

    /// Load settings from disk or create default if not exists.
    ///
    /// Out-of-bounds sync settings are replaced by the defaults.
    pub async fn load(&self) -> Result<AppSettings> {
        if !self.settings_path.exists() {
            tracing::info!("Settings file not found, creating default settings");
            let default = AppSettings::default();
            self.save(&default).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(&self.settings_path).await?;
        let mut settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Generic(format!("Failed to parse settings: {}", e)))?;

        if let Err(e) = settings.sync.validate() {
            tracing::warn!("Invalid sync settings, using defaults: {}", e);
            settings.sync = SyncSettings::default();
        }

        Ok(settings)
    }

    /// Save settings to disk
    pub async fn save(&self, settings: &AppSettings) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| AppError::Generic(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&self.settings_path, content).await?;
        tracing::info!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }

    pub async fn get_sync(&self) -> Result<SyncSettings> {
        let settings = self.load().await?;
        Ok(settings.sync)
    }

    /// Validate and persist new sync settings
    pub async fn update_sync(&self, sync: SyncSettings) -> Result<()> {
        sync.validate()?;

        let mut settings = self.load().await?;
        settings.sync = sync;
        self.save(&settings).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_service() -> (SettingsService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = SettingsService::new(temp_dir.path().to_path_buf());
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_default_settings_created_on_load() {
        let (service, temp) = create_test_service();

        let settings = service.load().await.unwrap();

        assert!(temp.path().join("settings.json").exists());
        assert_eq!(settings.sync.page_size, 100);
        assert_eq!(settings.sync.search_debounce_ms, 500);
        assert_eq!(settings.sync.undo_window_ms, 4_000);
        assert_eq!(settings.sync.refresh_cadence, "30s");
        assert_eq!(settings.sync.account_id, "anonymous");
    }

    #[tokio::test]
    async fn test_sync_settings_get_and_update() {
        let (service, _temp) = create_test_service();

        let updated = SyncSettings {
            page_size: 50,
            refresh_cadence: "5m".to_string(),
            account_id: "alice".to_string(),
            ..SyncSettings::default()
        };
        service.update_sync(updated.clone()).await.unwrap();

        let loaded = service.get_sync().await.unwrap();
        assert_eq!(loaded, updated);
    }

    #[tokio::test]
    async fn test_settings_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().to_path_buf();

        {
            let service = SettingsService::new(settings_path.clone());
            let updated = SyncSettings {
                undo_window_ms: 8_000,
                ..SyncSettings::default()
            };
            service.update_sync(updated).await.unwrap();
        }

        {
            let service = SettingsService::new(settings_path);
            let loaded = service.get_sync().await.unwrap();
            assert_eq!(loaded.undo_window_ms, 8_000);
        }
    }

    #[tokio::test]
    async fn test_update_rejects_out_of_bounds_values() {
        let (service, _temp) = create_test_service();

        let too_small = SyncSettings {
            page_size: 1,
            ..SyncSettings::default()
        };
        let bad_cadence = SyncSettings {
            refresh_cadence: "often".to_string(),
            ..SyncSettings::default()
        };

        assert!(matches!(service.update_sync(too_small).await, Err(AppError::Validation(_))));
        assert!(matches!(service.update_sync(bad_cadence).await, Err(AppError::Validation(_))));
        assert_eq!(service.get_sync().await.unwrap(), SyncSettings::default());
    }

    #[tokio::test]
    async fn test_missing_fields_use_defaults() {
        let (service, temp) = create_test_service();
        tokio::fs::write(temp.path().join("settings.json"), r#"{"sync":{"page_size":25}}"#)
            .await
            .unwrap();

        let sync = service.get_sync().await.unwrap();

        assert_eq!(sync.page_size, 25);
        assert_eq!(sync.undo_window_ms, 4_000);
    }

    #[tokio::test]
    async fn test_invalid_file_values_fall_back_to_defaults() {
        let (service, temp) = create_test_service();
        tokio::fs::write(temp.path().join("settings.json"), r#"{"sync":{"page_size":0}}"#)
            .await
            .unwrap();

        let sync = service.get_sync().await.unwrap();

        assert_eq!(sync, SyncSettings::default());
    }

    #[test]
    fn test_to_collection_config() {
        let settings = SyncSettings {
            page_size: 20,
            search_debounce_ms: 250,
            account_id: "bob".to_string(),
            ..SyncSettings::default()
        };

        let config = settings.to_collection_config();

        assert_eq!(config.page_size, 20);
        assert_eq!(config.search_debounce, Duration::from_millis(250));
        assert_eq!(config.account_id, "bob");
        assert_eq!(config.full_sync_batch_size, 500);
    }
}
