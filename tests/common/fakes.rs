use catalog_migrator::source_catalog::{SourceAlbum, SourceArtist, SourceCatalog};
use catalog_migrator::target_catalog::{NewPlaylist, TargetAlbum, TargetCatalog, TargetSong};
use catalog_migrator::CatalogError;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Source catalog answering from fixed artist and album tables.
#[derive(Default)]
pub struct FakeSourceCatalog {
    pub artist_names: HashMap<String, String>,
    pub album_upcs: HashMap<String, String>,
    pub calls: Mutex<usize>,
}

impl FakeSourceCatalog {
    pub fn with_artist(mut self, source_id: &str, name: &str) -> Self {
        self.artist_names
            .insert(source_id.to_string(), name.to_string());
        self
    }

    pub fn with_album_upc(mut self, source_id: &str, upc: &str) -> Self {
        self.album_upcs.insert(source_id.to_string(), upc.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl SourceCatalog for FakeSourceCatalog {
    fn get_artists(&self, source_ids: &[String]) -> Result<Vec<SourceArtist>, CatalogError> {
        *self.calls.lock().unwrap() += 1;
        Ok(source_ids
            .iter()
            .filter_map(|id| {
                self.artist_names.get(id).map(|name| SourceArtist {
                    source_id: id.clone(),
                    name: name.clone(),
                })
            })
            .collect())
    }

    fn get_albums(&self, source_ids: &[String]) -> Result<Vec<SourceAlbum>, CatalogError> {
        *self.calls.lock().unwrap() += 1;
        Ok(source_ids
            .iter()
            .map(|id| SourceAlbum {
                source_id: id.clone(),
                name: "Album".to_string(),
                upc: self.album_upcs.get(id).cloned(),
            })
            .collect())
    }
}

/// Target catalog with a fixed ISRC/UPC index that records every write.
#[derive(Default)]
pub struct FakeTargetCatalog {
    pub songs_by_isrc: Mutex<HashMap<String, String>>,
    pub albums_by_upc: HashMap<String, String>,
    /// Playlist names whose creation is rejected.
    pub rejected_playlists: Mutex<HashSet<String>>,
    pub lookups: Mutex<usize>,
    pub folders: Mutex<Vec<String>>,
    pub playlists: Mutex<Vec<NewPlaylist>>,
}

impl FakeTargetCatalog {
    pub fn with_song(self, isrc: &str, id: &str) -> Self {
        self.add_song(isrc, id);
        self
    }

    pub fn with_album(mut self, upc: &str, id: &str) -> Self {
        self.albums_by_upc.insert(upc.to_string(), id.to_string());
        self
    }

    pub fn add_song(&self, isrc: &str, id: &str) {
        self.songs_by_isrc
            .lock()
            .unwrap()
            .insert(isrc.to_string(), id.to_string());
    }

    pub fn reject_playlist(&self, name: &str) {
        self.rejected_playlists
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    pub fn accept_all_playlists(&self) {
        self.rejected_playlists.lock().unwrap().clear();
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }

    /// Number of folder and playlist creation calls.
    pub fn creations(&self) -> usize {
        self.folders.lock().unwrap().len() + self.playlists.lock().unwrap().len()
    }

    pub fn created_playlists(&self) -> Vec<NewPlaylist> {
        self.playlists.lock().unwrap().clone()
    }
}

impl TargetCatalog for FakeTargetCatalog {
    fn songs_by_isrc(&self, isrcs: &[String]) -> Result<Vec<TargetSong>, CatalogError> {
        *self.lookups.lock().unwrap() += 1;
        let songs = self.songs_by_isrc.lock().unwrap();
        Ok(isrcs
            .iter()
            .filter_map(|isrc| {
                songs.get(isrc).map(|id| TargetSong {
                    id: id.clone(),
                    name: format!("Apple {}", id),
                    artist_name: "Artist".to_string(),
                    isrc: isrc.clone(),
                })
            })
            .collect())
    }

    fn albums_by_upc(&self, upcs: &[String]) -> Result<Vec<TargetAlbum>, CatalogError> {
        *self.lookups.lock().unwrap() += 1;
        Ok(upcs
            .iter()
            .filter_map(|upc| {
                self.albums_by_upc.get(upc).map(|id| TargetAlbum {
                    id: id.clone(),
                    name: "Album".to_string(),
                    artist_name: "Artist".to_string(),
                    upc: upc.clone(),
                })
            })
            .collect())
    }

    fn create_folder(&self, name: &str) -> Result<String, CatalogError> {
        let mut folders = self.folders.lock().unwrap();
        folders.push(name.to_string());
        Ok(format!("p.folder{}", folders.len()))
    }

    fn create_playlist(&self, playlist: &NewPlaylist) -> Result<String, CatalogError> {
        if self.rejected_playlists.lock().unwrap().contains(&playlist.name) {
            return Err(CatalogError::Status {
                status: 500,
                body: "Internal Server Error".to_string(),
            });
        }
        let mut playlists = self.playlists.lock().unwrap();
        playlists.push(playlist.clone());
        Ok(format!("p.playlist{}", playlists.len()))
    }
}
