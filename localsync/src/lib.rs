//! localsync library
//!
//! Local-first synchronized collections: a controller that keeps a
//! paginated, filterable, searchable collection consistent between a local
//! cache and a remote service, plus the SQLite and HTTP adapters it runs on.

pub mod app;
pub mod collection;
pub mod config;
pub mod database;
pub mod error;
pub mod remote;
pub mod services;
