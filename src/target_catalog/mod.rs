//! The catalog the library is migrated to.

mod apple_music;

pub use apple_music::{AppleMusicClient, AppleMusicCredentials};

use crate::catalog_http::CatalogError;

/// Maximum ISRCs (or UPCs) per catalog filter lookup.
pub const MAX_CODES_PER_REQUEST: usize = 25;

/// A catalog song returned by an ISRC lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetSong {
    pub id: String,
    pub name: String,
    pub artist_name: String,
    pub isrc: String,
}

/// A catalog album returned by a UPC lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetAlbum {
    pub id: String,
    pub name: String,
    pub artist_name: String,
    pub upc: String,
}

/// A library playlist to create, tracks in playback order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPlaylist {
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub parent_folder_id: String,
    pub track_ids: Vec<String>,
}

#[cfg_attr(test, mockall::automock)]
pub trait TargetCatalog {
    /// Catalog songs carrying any of `isrcs`. A code may map to several songs
    /// or to none.
    fn songs_by_isrc(&self, isrcs: &[String]) -> Result<Vec<TargetSong>, CatalogError>;

    fn albums_by_upc(&self, upcs: &[String]) -> Result<Vec<TargetAlbum>, CatalogError>;

    /// Create a library playlist folder, returning its id.
    fn create_folder(&self, name: &str) -> Result<String, CatalogError>;

    /// Create a library playlist, returning its id.
    fn create_playlist(&self, playlist: &NewPlaylist) -> Result<String, CatalogError>;
}
