//! Catalog Migrator Library
//!
//! Moves a music library from one streaming catalog to another: playlist
//! exports are imported into a local store, enriched, matched against the
//! target catalog and replicated there.

pub mod backfill;
pub mod catalog_http;
pub mod config;
pub mod importer;
pub mod library_store;
pub mod matcher;
pub mod pipeline;
pub mod replicator;
pub mod source_catalog;
pub mod sqlite_persistence;
pub mod target_catalog;

// Re-export commonly used types for convenience
pub use catalog_http::CatalogError;
pub use library_store::{LibraryStore, SqliteLibraryStore};
pub use pipeline::{Pipeline, PipelineReport, PipelineSettings, Stage};
pub use source_catalog::{SourceCatalog, SpotifyClient};
pub use target_catalog::{AppleMusicClient, TargetCatalog};
