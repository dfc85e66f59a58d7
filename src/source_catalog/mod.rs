//! The catalog the library is migrated away from.

mod spotify;

pub use spotify::{SpotifyClient, SpotifyCredentials};

use crate::catalog_http::CatalogError;

/// Maximum artist ids per lookup call.
pub const MAX_ARTISTS_PER_REQUEST: usize = 50;
/// Maximum album ids per lookup call.
pub const MAX_ALBUMS_PER_REQUEST: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceArtist {
    pub source_id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceAlbum {
    pub source_id: String,
    pub name: String,
    pub upc: Option<String>,
}

/// Batch metadata lookups against the source catalog.
///
/// Ids passed in and returned are full source identities as stored in the
/// library (`spotify:artist:<id>`). Unknown ids are simply absent from the
/// result.
#[cfg_attr(test, mockall::automock)]
pub trait SourceCatalog {
    fn get_artists(&self, source_ids: &[String]) -> Result<Vec<SourceArtist>, CatalogError>;

    fn get_albums(&self, source_ids: &[String]) -> Result<Vec<SourceAlbum>, CatalogError>;
}
