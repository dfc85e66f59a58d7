mod models;
mod schema;
mod sqlite_library_store;

pub use models::*;
pub use schema::LIBRARY_VERSIONED_SCHEMAS;
pub use sqlite_library_store::SqliteLibraryStore;

use anyhow::Result;

/// Persistent cross-catalog identity store.
///
/// Every write is atomic on its own; batch writes (`apply_*`) commit all of
/// their rows in one transaction.
pub trait LibraryStore: Send + Sync {
    // =========================================================================
    // Upserts keyed by source identity
    // =========================================================================

    /// Create or refresh an artist. A `None` name never clears a known name.
    fn upsert_artist(&self, source_id: &str, source_name: Option<&str>)
        -> Result<Upserted<Artist>>;

    fn upsert_album(&self, source_id: &str, source_name: &str) -> Result<Upserted<Album>>;

    /// Create or refresh a song and replace its artist set.
    fn upsert_song(&self, song: &SongUpsert<'_>, artist_rowids: &[i64])
        -> Result<Upserted<Song>>;

    /// Playlist rows are keyed by the reference of the export they came from.
    fn upsert_playlist(&self, import_ref: &str) -> Result<Upserted<Playlist>>;

    /// Replace the ordered track list of a playlist with `song_rowids`,
    /// positions `0..len`. Returns whether anything changed.
    fn replace_playlist_tracks(&self, playlist_rowid: i64, song_rowids: &[i64]) -> Result<bool>;

    // =========================================================================
    // Remaining work
    // =========================================================================

    fn artists_missing_name(&self) -> Result<Vec<Artist>>;

    fn albums_missing_upc(&self) -> Result<Vec<Album>>;

    /// Albums with a UPC but no target identity.
    fn albums_missing_target(&self) -> Result<Vec<Album>>;

    /// Songs with an ISRC but no target identity.
    fn songs_missing_target(&self) -> Result<Vec<Song>>;

    fn playlists_missing_target(&self) -> Result<Vec<Playlist>>;

    // =========================================================================
    // Stage writes
    // =========================================================================

    /// Fill `source_name` of artists that do not have one yet.
    fn apply_artist_names(&self, updates: &[SourceFieldUpdate]) -> Result<ApplyOutcome>;

    /// Fill `upc` of albums that do not have one yet.
    fn apply_album_upcs(&self, updates: &[SourceFieldUpdate]) -> Result<ApplyOutcome>;

    /// Link songs to target identities. Songs already linked are left alone.
    /// Returns the number of rows linked.
    fn apply_song_matches(&self, links: &[TargetLink]) -> Result<usize>;

    fn apply_album_matches(&self, links: &[TargetLink]) -> Result<usize>;

    fn link_playlist(&self, playlist_rowid: i64, target_id: &str, target_name: &str)
        -> Result<()>;

    // =========================================================================
    // Config singleton
    // =========================================================================

    fn get_or_create_config(&self) -> Result<Config>;

    fn set_target_folder(&self, folder_id: &str) -> Result<()>;

    // =========================================================================
    // Reads
    // =========================================================================

    fn get_artist(&self, source_id: &str) -> Result<Option<Artist>>;

    fn get_album(&self, source_id: &str) -> Result<Option<Album>>;

    fn get_song(&self, source_id: &str) -> Result<Option<Song>>;

    fn get_playlist(&self, rowid: i64) -> Result<Option<Playlist>>;

    fn song_artists(&self, song_rowid: i64) -> Result<Vec<Artist>>;

    fn playlist_tracks(&self, playlist_rowid: i64) -> Result<Vec<PlaylistTrack>>;

    /// Ordered track list of a playlist joined with each song's target id.
    fn playlist_track_targets(&self, playlist_rowid: i64) -> Result<Vec<PlaylistTrackTarget>>;

    fn counts(&self) -> Result<LibraryCounts>;

    fn pending_work(&self) -> Result<PendingWork>;
}
