//! Synchronization configuration constants
//!
//! Central location for all paging sizes, timer windows, resource limits,
//! and validation boundaries used by collection controllers.

use std::time::Duration;

// ===== Paging =====

/// Items per unfiltered page and per `show_more` step of the display cap
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Minimum page size accepted from settings
pub const MIN_PAGE_SIZE: usize = 10;

/// Maximum page size accepted from settings.
/// Larger pages make the first paint noticeably slower.
pub const MAX_PAGE_SIZE: usize = 1_000;

/// Batch size for the one-time full sync sweep
pub const FULL_SYNC_BATCH_SIZE: usize = 500;

/// Upper bound on rows pulled by a facet filter query or a cache search
pub const FILTER_QUERY_LIMIT: usize = 10_000;

// ===== Timers =====

/// Initial cache read is abandoned after this long (a cold store must not block first paint)
pub const DEFAULT_CACHE_READ_TIMEOUT_MS: u64 = 3_000;

/// Quiet period before a typed search query settles
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 500;

/// Minimum search debounce in milliseconds
pub const MIN_SEARCH_DEBOUNCE_MS: u64 = 50;

/// Maximum search debounce in milliseconds
pub const MAX_SEARCH_DEBOUNCE_MS: u64 = 5_000;

/// Length of the undo window after a delete request
pub const DEFAULT_UNDO_WINDOW_MS: u64 = 4_000;

/// Countdown resolution of the undo window
pub const UNDO_TICK_MS: u64 = 100;

/// Maximum undo window in milliseconds
pub const MAX_UNDO_WINDOW_MS: u64 = 30_000;

/// Background refresh is skipped if the last successful load/refresh is younger than this
pub const DEFAULT_MIN_REFRESH_INTERVAL_SECS: u64 = 10;

/// Cadence of the background refresh job ("30s", "5m", ...)
pub const DEFAULT_REFRESH_CADENCE: &str = "30s";

/// Account key used when no account is signed in
pub const ANONYMOUS_ACCOUNT: &str = "anonymous";

/// Runtime tuning for one collection controller
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub page_size: usize,
    pub full_sync_batch_size: usize,
    pub query_limit: usize,
    pub cache_read_timeout: Duration,
    pub search_debounce: Duration,
    pub undo_window: Duration,
    pub undo_tick: Duration,
    pub min_refresh_interval: Duration,
    /// Key for the per-account full-sync marker
    pub account_id: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            full_sync_batch_size: FULL_SYNC_BATCH_SIZE,
            query_limit: FILTER_QUERY_LIMIT,
            cache_read_timeout: Duration::from_millis(DEFAULT_CACHE_READ_TIMEOUT_MS),
            search_debounce: Duration::from_millis(DEFAULT_SEARCH_DEBOUNCE_MS),
            undo_window: Duration::from_millis(DEFAULT_UNDO_WINDOW_MS),
            undo_tick: Duration::from_millis(UNDO_TICK_MS),
            min_refresh_interval: Duration::from_secs(DEFAULT_MIN_REFRESH_INTERVAL_SECS),
            account_id: ANONYMOUS_ACCOUNT.to_string(),
        }
    }
}
