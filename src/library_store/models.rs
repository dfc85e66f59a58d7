//! Library entities as stored in the migration database.
//!
//! Every entity carries the identity it has in the source catalog and, once
//! reconciled, the identity it has in the target catalog. A `None` target id
//! means the entity still has work pending.

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Artist {
    pub rowid: i64,
    pub source_id: String,
    pub source_name: Option<String>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Album {
    pub rowid: i64,
    pub source_id: String,
    pub source_name: String,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub upc: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Song {
    pub rowid: i64,
    pub source_id: String,
    pub source_name: Option<String>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub isrc: Option<String>,
    pub album_rowid: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Playlist {
    pub rowid: i64,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub import_ref: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlaylistTrack {
    pub playlist_rowid: i64,
    pub song_rowid: i64,
    pub position: i64,
}

/// Process-wide state shared across runs. Exactly one row exists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Config {
    pub target_folder_id: Option<String>,
}

// =============================================================================
// Write inputs
// =============================================================================

/// Mutable fields of a song, keyed by `source_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SongUpsert<'a> {
    pub source_id: &'a str,
    pub source_name: Option<&'a str>,
    pub isrc: Option<&'a str>,
    pub album_rowid: Option<i64>,
}

/// A source catalog record carrying a secondary field to backfill.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFieldUpdate {
    pub source_id: String,
    pub value: String,
}

/// A target catalog identity to attach to a local row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetLink {
    pub rowid: i64,
    pub target_id: String,
    pub target_name: Option<String>,
}

// =============================================================================
// Read projections
// =============================================================================

/// What happened to a row during an upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RowChange {
    Created,
    Updated,
    Unchanged,
}

/// The row resulting from an upsert, and how it got there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upserted<T> {
    pub row: T,
    pub change: RowChange,
}

/// One entry of a playlist's ordered track list joined with the song's
/// target identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistTrackTarget {
    pub position: i64,
    pub song_source_id: String,
    pub song_target_id: Option<String>,
}

/// Outcome of applying a batch of backfill values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: usize,
    /// Source ids that had no local row.
    pub unknown: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LibraryCounts {
    pub artists: usize,
    pub albums: usize,
    pub songs: usize,
    pub playlists: usize,
    pub playlist_tracks: usize,
}

/// Rows each stage still has to process.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PendingWork {
    pub artists_missing_name: usize,
    pub albums_missing_upc: usize,
    pub albums_missing_target: usize,
    pub songs_missing_target: usize,
    pub songs_without_isrc: usize,
    pub playlists_missing_target: usize,
}
