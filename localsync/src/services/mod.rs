//! Services module
//!
//! Application services around the collection controllers: persisted
//! settings and the periodic background refresh.

pub mod scheduler;
pub mod settings;

pub use scheduler::{RefreshCadence, RefreshScheduler, Refreshable};
pub use settings::{AppSettings, SettingsService, SyncSettings};
