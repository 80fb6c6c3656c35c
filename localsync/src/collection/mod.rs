//! Local-first synchronized collections
//!
//! A [`SyncedCollection`] keeps a durable local cache, an in-memory display
//! projection, and a remote service consistent while the user pages, filters,
//! searches, and edits.

mod context;
mod controller;
pub mod facet;
pub mod facet_index;
pub mod item;
pub mod memory_cache;
mod mutations;
pub mod ports;
pub mod projector;
mod search;
mod state;
pub mod undo;


pub use controller::SyncedCollection;
pub use facet::{Facet, ItemFacet, Predicate};
pub use facet_index::FacetCounts;
pub use item::{Category, FieldUpdate, Item, SyncItem, SyncState, Visibility};
pub use memory_cache::InMemoryCache;
pub use ports::{LocalCache, RemoteService, SyncMarkerStore};
pub use projector::{DisplayState, FilterSelection, SourceKind};
pub use state::CollectionSnapshot;
pub use undo::PendingDeletionView;
