//! Common test infrastructure
//!
//! In-memory catalogs standing in for Spotify and Apple Music, plus helpers to
//! write playlist exports and open a scratch migration database.

#![allow(dead_code)]

mod exports;
mod fakes;

pub use exports::{write_export, ExportTrack};
pub use fakes::{FakeSourceCatalog, FakeTargetCatalog};

use catalog_migrator::SqliteLibraryStore;
use tempfile::TempDir;

/// A fresh migration database in its own temporary directory.
pub fn create_tmp_store() -> (SqliteLibraryStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = SqliteLibraryStore::new(temp_dir.path().join("library.db")).unwrap();
    (store, temp_dir)
}
