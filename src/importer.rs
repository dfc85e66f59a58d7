//! Playlist export importer.
//!
//! Reads source-catalog playlist exports (CSV, one row per track in playback
//! order) and upserts the entity graph they describe: artists, the album, the
//! song with its artist set, and the playlist's ordered track list. Every
//! write is keyed by source identity, so importing the same export again only
//! refreshes what changed.

use crate::library_store::{LibraryStore, RowChange, SongUpsert};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One row of a playlist export. Columns not listed here are ignored.
#[derive(Debug, Deserialize)]
struct ExportRow {
    #[serde(rename = "Track URI", default)]
    track_uri: String,
    #[serde(rename = "Track Name", default)]
    track_name: String,
    #[serde(rename = "Artist URI(s)", default)]
    artist_uris: String,
    #[serde(rename = "Artist Name(s)", default)]
    artist_names: String,
    #[serde(rename = "Album URI", default)]
    album_uri: String,
    #[serde(rename = "Album Name", default)]
    album_name: String,
    #[serde(rename = "ISRC", default)]
    isrc: String,
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Split a multi-artist identifier field. Only a single-artist row carries a
/// name that can be attributed to its artist.
fn split_artists(row: &ExportRow) -> Vec<(&str, Option<&str>)> {
    let ids: Vec<&str> = row.artist_uris.split(',').filter_map(non_empty).collect();
    match ids.as_slice() {
        [single] => vec![(*single, non_empty(&row.artist_names))],
        _ => ids.into_iter().map(|id| (id, None)).collect(),
    }
}

/// Created/updated/unchanged tally for one entity kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl ChangeCounts {
    fn record(&mut self, change: RowChange) {
        match change {
            RowChange::Created => self.created += 1,
            RowChange::Updated => self.updated += 1,
            RowChange::Unchanged => self.unchanged += 1,
        }
    }

    fn merge(&mut self, other: &ChangeCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }

    pub fn changed(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub files: usize,
    pub rows_read: usize,
    /// Rows without a track identifier (local files).
    pub rows_skipped: usize,
    pub artists: ChangeCounts,
    pub albums: ChangeCounts,
    pub songs: ChangeCounts,
    pub playlists: ChangeCounts,
    pub tracks_written: usize,
    /// Playlists whose ordered track list differed from the stored one.
    pub track_lists_changed: usize,
}

impl ImportReport {
    pub fn merge(&mut self, other: &ImportReport) {
        self.files += other.files;
        self.rows_read += other.rows_read;
        self.rows_skipped += other.rows_skipped;
        self.artists.merge(&other.artists);
        self.albums.merge(&other.albums);
        self.songs.merge(&other.songs);
        self.playlists.merge(&other.playlists);
        self.tracks_written += other.tracks_written;
        self.track_lists_changed += other.track_lists_changed;
    }

    /// Number of upserts that created or modified a row.
    pub fn changing_writes(&self) -> usize {
        self.artists.changed()
            + self.albums.changed()
            + self.songs.changed()
            + self.playlists.changed()
            + self.track_lists_changed
    }
}

/// Import one export read from `reader`. `import_ref` identifies the export
/// and keys its playlist row.
pub fn import_reader<R: Read>(
    store: &dyn LibraryStore,
    import_ref: &str,
    reader: R,
) -> Result<ImportReport> {
    let mut report = ImportReport {
        files: 1,
        ..Default::default()
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    // Parse the whole export before writing, so a malformed file leaves the
    // store untouched.
    let rows = csv_reader
        .deserialize::<ExportRow>()
        .enumerate()
        .map(|(line, record)| {
            record.with_context(|| format!("Malformed row {} in {}", line + 1, import_ref))
        })
        .collect::<Result<Vec<_>>>()?;

    let playlist = store.upsert_playlist(import_ref)?;
    report.playlists.record(playlist.change);

    let mut song_rowids = Vec::new();
    for (line, row) in rows.iter().enumerate() {
        report.rows_read += 1;

        let Some(track_uri) = non_empty(&row.track_uri) else {
            debug!("Skipping row {} of {}: no track identifier", line + 1, import_ref);
            report.rows_skipped += 1;
            continue;
        };

        let mut artist_rowids = Vec::new();
        for (artist_uri, artist_name) in split_artists(row) {
            let artist = store.upsert_artist(artist_uri, artist_name)?;
            report.artists.record(artist.change);
            artist_rowids.push(artist.row.rowid);
        }

        let album_rowid = match non_empty(&row.album_uri) {
            Some(album_uri) => {
                let album = store.upsert_album(album_uri, row.album_name.trim())?;
                report.albums.record(album.change);
                Some(album.row.rowid)
            }
            None => None,
        };

        let isrc = non_empty(&row.isrc).map(str::to_uppercase);
        let song = store.upsert_song(
            &SongUpsert {
                source_id: track_uri,
                source_name: non_empty(&row.track_name),
                isrc: isrc.as_deref(),
                album_rowid,
            },
            &artist_rowids,
        )?;
        report.songs.record(song.change);
        song_rowids.push(song.row.rowid);
    }

    if store.replace_playlist_tracks(playlist.row.rowid, &song_rowids)? {
        report.track_lists_changed += 1;
    }
    report.tracks_written = song_rowids.len();

    Ok(report)
}

/// Import one export file. The file path is the import reference.
pub fn import_file(store: &dyn LibraryStore, path: &Path) -> Result<ImportReport> {
    let file =
        File::open(path).with_context(|| format!("Failed to open export file: {:?}", path))?;
    let import_ref = path.to_string_lossy();
    let report = import_reader(store, &import_ref, file)?;
    info!(
        "Imported {:?}: {} tracks, {} skipped rows",
        path, report.tracks_written, report.rows_skipped
    );
    Ok(report)
}

/// Every `*.csv` file directly inside `dir`, sorted by file name.
pub fn export_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read exports directory: {:?}", dir))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Import every export file in `dir`, in file-name order.
pub fn import_dir(store: &dyn LibraryStore, dir: &Path) -> Result<ImportReport> {
    let files = export_files(dir)?;
    if files.is_empty() {
        warn!("No export files found in {:?}", dir);
    }
    import_paths(store, &files)
}

/// Import each path in order, descending into directories.
pub fn import_paths(store: &dyn LibraryStore, paths: &[PathBuf]) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for path in paths {
        let file_report = if path.is_dir() {
            import_dir(store, path)?
        } else {
            import_file(store, path)?
        };
        report.merge(&file_report);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::SqliteLibraryStore;
    use tempfile::TempDir;

    const HEADER: &str =
        "Track URI,Track Name,Artist URI(s),Artist Name(s),Album URI,Album Name,ISRC,Added At\n";

    fn create_tmp_store() -> (SqliteLibraryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteLibraryStore::new(temp_dir.path().join("library.db")).unwrap();
        (store, temp_dir)
    }

    fn export(rows: &[&str]) -> String {
        let mut csv = HEADER.to_string();
        for row in rows {
            csv.push_str(row);
            csv.push('\n');
        }
        csv
    }

    #[test]
    fn test_import_builds_entity_graph() {
        let (store, _dir) = create_tmp_store();
        let csv = export(&[
            "spotify:track:t1,Song One,spotify:artist:a1,Artist One,spotify:album:x,Album X,usrc11111111,2020-01-01",
            "spotify:track:t2,Song Two,spotify:artist:a1,Artist One,spotify:album:x,Album X,USRC22222222,2020-01-01",
        ]);

        let report = import_reader(&store, "exports/road_trip.csv", csv.as_bytes()).unwrap();

        assert_eq!(report.rows_read, 2);
        assert_eq!(report.songs.created, 2);
        assert_eq!(report.artists.created, 1);
        assert_eq!(report.albums.created, 1);
        assert_eq!(report.tracks_written, 2);
        assert_eq!(report.track_lists_changed, 1);

        let song = store.get_song("spotify:track:t1").unwrap().unwrap();
        assert_eq!(song.isrc.as_deref(), Some("USRC11111111"));
        let album = store.get_album("spotify:album:x").unwrap().unwrap();
        assert_eq!(song.album_rowid, Some(album.rowid));
        let artists = store.song_artists(song.rowid).unwrap();
        assert_eq!(artists.len(), 1);
        assert_eq!(artists[0].source_name.as_deref(), Some("Artist One"));
    }

    #[test]
    fn test_multi_artist_names_are_left_for_backfill() {
        let (store, _dir) = create_tmp_store();
        let csv = export(&[
            "spotify:track:t1,Duet,\"spotify:artist:1, spotify:artist:2\",A & B,spotify:album:x,Album X,USRC1,",
        ]);

        import_reader(&store, "duets.csv", csv.as_bytes()).unwrap();

        for id in ["spotify:artist:1", "spotify:artist:2"] {
            let artist = store.get_artist(id).unwrap().unwrap();
            assert_eq!(artist.source_name, None);
        }
        let song = store.get_song("spotify:track:t1").unwrap().unwrap();
        assert_eq!(store.song_artists(song.rowid).unwrap().len(), 2);
    }

    #[test]
    fn test_multi_artist_row_does_not_clear_known_name() {
        let (store, _dir) = create_tmp_store();
        let csv = export(&[
            "spotify:track:t1,Solo,spotify:artist:1,Alice,spotify:album:x,Album X,USRC1,",
            "spotify:track:t2,Duet,\"spotify:artist:1,spotify:artist:2\",Alice & Bob,spotify:album:x,Album X,USRC2,",
        ]);

        import_reader(&store, "mixed.csv", csv.as_bytes()).unwrap();

        let alice = store.get_artist("spotify:artist:1").unwrap().unwrap();
        assert_eq!(alice.source_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let (store, _dir) = create_tmp_store();
        let csv = export(&[
            "spotify:track:t1,Song One,spotify:artist:a1,Artist One,spotify:album:x,Album X,USRC1,",
            "spotify:track:t2,Song Two,spotify:artist:a2,Artist Two,spotify:album:y,Album Y,USRC2,",
        ]);

        import_reader(&store, "list.csv", csv.as_bytes()).unwrap();
        let counts = store.counts().unwrap();
        let report = import_reader(&store, "list.csv", csv.as_bytes()).unwrap();

        assert_eq!(store.counts().unwrap(), counts);
        assert_eq!(report.changing_writes(), 0);
        assert_eq!(report.songs.unchanged, 2);
    }

    #[test]
    fn test_reordered_export_rewrites_positions() {
        let (store, _dir) = create_tmp_store();
        let first = export(&[
            "spotify:track:t1,One,spotify:artist:a,A,,,USRC1,",
            "spotify:track:t2,Two,spotify:artist:a,A,,,USRC2,",
        ]);
        let reordered = export(&[
            "spotify:track:t2,Two,spotify:artist:a,A,,,USRC2,",
            "spotify:track:t1,One,spotify:artist:a,A,,,USRC1,",
        ]);

        import_reader(&store, "list.csv", first.as_bytes()).unwrap();
        let report = import_reader(&store, "list.csv", reordered.as_bytes()).unwrap();
        assert_eq!(report.track_lists_changed, 1);

        let playlist = store.playlists_missing_target().unwrap().remove(0);
        let targets = store.playlist_track_targets(playlist.rowid).unwrap();
        let order: Vec<&str> = targets.iter().map(|t| t.song_source_id.as_str()).collect();
        assert_eq!(order, vec!["spotify:track:t2", "spotify:track:t1"]);
    }

    #[test]
    fn test_local_files_are_skipped_and_empty_fields_are_null() {
        let (store, _dir) = create_tmp_store();
        let csv = export(&[
            ",My Local Recording,,,,,,",
            "spotify:track:t1,No Album,spotify:artist:a,A,,,,",
        ]);

        let report = import_reader(&store, "local.csv", csv.as_bytes()).unwrap();

        assert_eq!(report.rows_read, 2);
        assert_eq!(report.rows_skipped, 1);
        assert_eq!(report.tracks_written, 1);
        let song = store.get_song("spotify:track:t1").unwrap().unwrap();
        assert_eq!(song.album_rowid, None);
        assert_eq!(song.isrc, None);
    }

    #[test]
    fn test_malformed_export_writes_nothing() {
        let (store, _dir) = create_tmp_store();
        let csv = export(&[
            "spotify:track:t1,One,spotify:artist:a,A,spotify:album:x,Album X,USRC1,",
            "spotify:track:t2,\"Unterminated,spotify:artist:a,A,,,USRC2,",
        ]);

        let result = import_reader(&store, "broken.csv", csv.as_bytes());

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Malformed row 2 in broken.csv"), "{}", message);
        let counts = store.counts().unwrap();
        assert_eq!(counts.playlists, 0);
        assert_eq!(counts.songs, 0);
        assert_eq!(counts.artists, 0);
        assert!(store.get_song("spotify:track:t1").unwrap().is_none());
    }

    #[test]
    fn test_import_dir_reads_csv_files_in_name_order() {
        let (store, dir) = create_tmp_store();
        let exports = dir.path().join("exports");
        std::fs::create_dir(&exports).unwrap();
        std::fs::write(
            exports.join("b_second.csv"),
            export(&["spotify:track:t2,Two,spotify:artist:a,A,,,USRC2,"]),
        )
        .unwrap();
        std::fs::write(
            exports.join("a_first.csv"),
            export(&["spotify:track:t1,One,spotify:artist:a,A,,,USRC1,"]),
        )
        .unwrap();
        std::fs::write(exports.join("notes.txt"), "not an export").unwrap();

        let files = export_files(&exports).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_first.csv", "b_second.csv"]);

        let report = import_dir(&store, &exports).unwrap();
        assert_eq!(report.files, 2);
        assert_eq!(report.playlists.created, 2);
        assert_eq!(store.counts().unwrap().playlists, 2);
    }
}
