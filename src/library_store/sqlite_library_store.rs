//! SQLite-backed implementation of [`LibraryStore`].

use super::models::*;
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use super::LibraryStore;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const ARTIST_COLUMNS: &str = "rowid, source_id, source_name, target_id, target_name";
const ALBUM_COLUMNS: &str = "rowid, source_id, source_name, target_id, target_name, upc";
const SONG_COLUMNS: &str =
    "rowid, source_id, source_name, target_id, target_name, isrc, album_rowid";
const PLAYLIST_COLUMNS: &str = "rowid, target_id, target_name, import_ref";

/// Single-writer store: one connection guarded by a mutex, so every method
/// runs to completion before the next one starts.
#[derive(Clone)]
pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = open_versioned_db(path, LIBRARY_VERSIONED_SCHEMAS, "library")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        let counts = store.counts()?;
        info!(
            "Opened library at {:?}: {} artists, {} albums, {} songs, {} playlists",
            path, counts.artists, counts.albums, counts.songs, counts.playlists
        );
        Ok(store)
    }

    // =========================================================================
    // Row parsing
    // =========================================================================

    fn parse_artist_row(row: &Row) -> rusqlite::Result<Artist> {
        Ok(Artist {
            rowid: row.get(0)?,
            source_id: row.get(1)?,
            source_name: row.get(2)?,
            target_id: row.get(3)?,
            target_name: row.get(4)?,
        })
    }

    fn parse_album_row(row: &Row) -> rusqlite::Result<Album> {
        Ok(Album {
            rowid: row.get(0)?,
            source_id: row.get(1)?,
            source_name: row.get(2)?,
            target_id: row.get(3)?,
            target_name: row.get(4)?,
            upc: row.get(5)?,
        })
    }

    fn parse_song_row(row: &Row) -> rusqlite::Result<Song> {
        Ok(Song {
            rowid: row.get(0)?,
            source_id: row.get(1)?,
            source_name: row.get(2)?,
            target_id: row.get(3)?,
            target_name: row.get(4)?,
            isrc: row.get(5)?,
            album_rowid: row.get(6)?,
        })
    }

    fn parse_playlist_row(row: &Row) -> rusqlite::Result<Playlist> {
        Ok(Playlist {
            rowid: row.get(0)?,
            target_id: row.get(1)?,
            target_name: row.get(2)?,
            import_ref: row.get(3)?,
        })
    }

    // =========================================================================
    // Internal helpers (take a connection so they work inside transactions)
    // =========================================================================

    fn query_artist(conn: &Connection, source_id: &str) -> Result<Option<Artist>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM artists WHERE source_id = ?1",
            ARTIST_COLUMNS
        ))?;
        Ok(stmt
            .query_row(params![source_id], Self::parse_artist_row)
            .optional()?)
    }

    fn query_album(conn: &Connection, source_id: &str) -> Result<Option<Album>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM albums WHERE source_id = ?1",
            ALBUM_COLUMNS
        ))?;
        Ok(stmt
            .query_row(params![source_id], Self::parse_album_row)
            .optional()?)
    }

    fn query_song(conn: &Connection, source_id: &str) -> Result<Option<Song>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM songs WHERE source_id = ?1",
            SONG_COLUMNS
        ))?;
        Ok(stmt
            .query_row(params![source_id], Self::parse_song_row)
            .optional()?)
    }

    fn query_playlist_by_ref(conn: &Connection, import_ref: &str) -> Result<Option<Playlist>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM playlists WHERE import_ref = ?1",
            PLAYLIST_COLUMNS
        ))?;
        Ok(stmt
            .query_row(params![import_ref], Self::parse_playlist_row)
            .optional()?)
    }

    fn query_song_artist_rowids(conn: &Connection, song_rowid: i64) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare_cached(
            "SELECT artist_rowid FROM song_artists WHERE song_rowid = ?1 ORDER BY artist_rowid",
        )?;
        let rowids = stmt
            .query_map(params![song_rowid], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(rowids)
    }

    fn query_playlist_tracks(conn: &Connection, playlist_rowid: i64) -> Result<Vec<PlaylistTrack>> {
        let mut stmt = conn.prepare_cached(
            "SELECT playlist_rowid, song_rowid, position FROM playlist_tracks
             WHERE playlist_rowid = ?1 ORDER BY position",
        )?;
        let tracks = stmt
            .query_map(params![playlist_rowid], |row| {
                Ok(PlaylistTrack {
                    playlist_rowid: row.get(0)?,
                    song_rowid: row.get(1)?,
                    position: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn count(conn: &Connection, sql: &str) -> Result<usize> {
        let count: i64 = conn.query_row(sql, [], |r| r.get(0))?;
        Ok(count as usize)
    }

    fn select_all<T>(
        &self,
        sql: &str,
        parse: fn(&Row) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map([], parse)?.collect::<Result<Vec<T>, _>>()?;
        Ok(rows)
    }

    /// Fill a nullable source-side column for rows that still lack it.
    fn apply_source_field(
        &self,
        table: &str,
        column: &str,
        updates: &[SourceFieldUpdate],
    ) -> Result<ApplyOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut outcome = ApplyOutcome::default();
        {
            let mut update_stmt = tx.prepare(&format!(
                "UPDATE {table} SET {column} = ?2 WHERE source_id = ?1 AND {column} IS NULL"
            ))?;
            let mut exists_stmt =
                tx.prepare(&format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE source_id = ?1)"))?;

            for update in updates {
                let changed = update_stmt.execute(params![update.source_id, update.value])?;
                if changed > 0 {
                    outcome.applied += changed;
                    continue;
                }
                let exists: bool =
                    exists_stmt.query_row(params![update.source_id], |r| r.get(0))?;
                if !exists {
                    outcome.unknown.push(update.source_id.clone());
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    /// Attach target identities to rows that are not linked yet.
    fn apply_target_links(&self, table: &str, links: &[TargetLink]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut linked = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE {table} SET target_id = ?2, target_name = ?3 WHERE rowid = ?1 AND target_id IS NULL"
            ))?;
            for link in links {
                linked += stmt.execute(params![link.rowid, link.target_id, link.target_name])?;
            }
        }
        tx.commit()?;
        Ok(linked)
    }
}

impl LibraryStore for SqliteLibraryStore {
    fn upsert_artist(
        &self,
        source_id: &str,
        source_name: Option<&str>,
    ) -> Result<Upserted<Artist>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let change = match Self::query_artist(&tx, source_id)? {
            None => {
                tx.execute(
                    "INSERT INTO artists (source_id, source_name) VALUES (?1, ?2)",
                    params![source_id, source_name],
                )?;
                RowChange::Created
            }
            Some(existing) => match source_name {
                Some(name) if existing.source_name.as_deref() != Some(name) => {
                    tx.execute(
                        "UPDATE artists SET source_name = ?2 WHERE rowid = ?1",
                        params![existing.rowid, name],
                    )?;
                    RowChange::Updated
                }
                _ => RowChange::Unchanged,
            },
        };

        let Some(row) = Self::query_artist(&tx, source_id)? else {
            bail!("Artist {} vanished during upsert", source_id);
        };
        tx.commit()?;
        Ok(Upserted { row, change })
    }

    fn upsert_album(&self, source_id: &str, source_name: &str) -> Result<Upserted<Album>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let change = match Self::query_album(&tx, source_id)? {
            None => {
                tx.execute(
                    "INSERT INTO albums (source_id, source_name) VALUES (?1, ?2)",
                    params![source_id, source_name],
                )?;
                RowChange::Created
            }
            Some(existing) if existing.source_name != source_name => {
                tx.execute(
                    "UPDATE albums SET source_name = ?2 WHERE rowid = ?1",
                    params![existing.rowid, source_name],
                )?;
                RowChange::Updated
            }
            Some(_) => RowChange::Unchanged,
        };

        let Some(row) = Self::query_album(&tx, source_id)? else {
            bail!("Album {} vanished during upsert", source_id);
        };
        tx.commit()?;
        Ok(Upserted { row, change })
    }

    fn upsert_song(&self, song: &SongUpsert<'_>, artist_rowids: &[i64]) -> Result<Upserted<Song>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut change = match Self::query_song(&tx, song.source_id)? {
            None => {
                tx.execute(
                    "INSERT INTO songs (source_id, source_name, isrc, album_rowid) VALUES (?1, ?2, ?3, ?4)",
                    params![song.source_id, song.source_name, song.isrc, song.album_rowid],
                )?;
                RowChange::Created
            }
            Some(existing) => {
                // Absent values never clear what an earlier import recorded.
                let name = song.source_name.or(existing.source_name.as_deref());
                let isrc = song.isrc.or(existing.isrc.as_deref());
                let album_rowid = song.album_rowid.or(existing.album_rowid);

                if name != existing.source_name.as_deref()
                    || isrc != existing.isrc.as_deref()
                    || album_rowid != existing.album_rowid
                {
                    tx.execute(
                        "UPDATE songs SET source_name = ?2, isrc = ?3, album_rowid = ?4 WHERE rowid = ?1",
                        params![existing.rowid, name, isrc, album_rowid],
                    )?;
                    RowChange::Updated
                } else {
                    RowChange::Unchanged
                }
            }
        };

        let Some(row) = Self::query_song(&tx, song.source_id)? else {
            bail!("Song {} vanished during upsert", song.source_id);
        };

        let mut wanted: Vec<i64> = artist_rowids.to_vec();
        wanted.sort_unstable();
        wanted.dedup();
        let current = Self::query_song_artist_rowids(&tx, row.rowid)?;
        if current != wanted {
            tx.execute(
                "DELETE FROM song_artists WHERE song_rowid = ?1",
                params![row.rowid],
            )?;
            for artist_rowid in &wanted {
                tx.execute(
                    "INSERT INTO song_artists (song_rowid, artist_rowid) VALUES (?1, ?2)",
                    params![row.rowid, artist_rowid],
                )?;
            }
            if change == RowChange::Unchanged {
                change = RowChange::Updated;
            }
        }

        tx.commit()?;
        Ok(Upserted { row, change })
    }

    fn upsert_playlist(&self, import_ref: &str) -> Result<Upserted<Playlist>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let change = match Self::query_playlist_by_ref(&tx, import_ref)? {
            Some(_) => RowChange::Unchanged,
            None => {
                tx.execute(
                    "INSERT INTO playlists (import_ref) VALUES (?1)",
                    params![import_ref],
                )?;
                RowChange::Created
            }
        };

        let Some(row) = Self::query_playlist_by_ref(&tx, import_ref)? else {
            bail!("Playlist {} vanished during upsert", import_ref);
        };
        tx.commit()?;
        Ok(Upserted { row, change })
    }

    fn replace_playlist_tracks(&self, playlist_rowid: i64, song_rowids: &[i64]) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing = Self::query_playlist_tracks(&tx, playlist_rowid)?;
        if existing.iter().map(|t| t.song_rowid).eq(song_rowids.iter().copied()) {
            return Ok(false);
        }

        tx.execute(
            "DELETE FROM playlist_tracks WHERE playlist_rowid = ?1",
            params![playlist_rowid],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO playlist_tracks (playlist_rowid, song_rowid, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, song_rowid) in song_rowids.iter().enumerate() {
                stmt.execute(params![playlist_rowid, song_rowid, position as i64])?;
            }
        }
        tx.commit()?;
        Ok(true)
    }

    fn artists_missing_name(&self) -> Result<Vec<Artist>> {
        self.select_all(
            &format!(
                "SELECT {} FROM artists WHERE source_name IS NULL ORDER BY rowid",
                ARTIST_COLUMNS
            ),
            Self::parse_artist_row,
        )
    }

    fn albums_missing_upc(&self) -> Result<Vec<Album>> {
        self.select_all(
            &format!(
                "SELECT {} FROM albums WHERE upc IS NULL ORDER BY rowid",
                ALBUM_COLUMNS
            ),
            Self::parse_album_row,
        )
    }

    fn albums_missing_target(&self) -> Result<Vec<Album>> {
        self.select_all(
            &format!(
                "SELECT {} FROM albums WHERE target_id IS NULL AND upc IS NOT NULL ORDER BY rowid",
                ALBUM_COLUMNS
            ),
            Self::parse_album_row,
        )
    }

    fn songs_missing_target(&self) -> Result<Vec<Song>> {
        self.select_all(
            &format!(
                "SELECT {} FROM songs WHERE target_id IS NULL AND isrc IS NOT NULL ORDER BY rowid",
                SONG_COLUMNS
            ),
            Self::parse_song_row,
        )
    }

    fn playlists_missing_target(&self) -> Result<Vec<Playlist>> {
        self.select_all(
            &format!(
                "SELECT {} FROM playlists WHERE target_id IS NULL ORDER BY rowid",
                PLAYLIST_COLUMNS
            ),
            Self::parse_playlist_row,
        )
    }

    fn apply_artist_names(&self, updates: &[SourceFieldUpdate]) -> Result<ApplyOutcome> {
        self.apply_source_field("artists", "source_name", updates)
    }

    fn apply_album_upcs(&self, updates: &[SourceFieldUpdate]) -> Result<ApplyOutcome> {
        self.apply_source_field("albums", "upc", updates)
    }

    fn apply_song_matches(&self, links: &[TargetLink]) -> Result<usize> {
        self.apply_target_links("songs", links)
    }

    fn apply_album_matches(&self, links: &[TargetLink]) -> Result<usize> {
        self.apply_target_links("albums", links)
    }

    fn link_playlist(&self, playlist_rowid: i64, target_id: &str, target_name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE playlists SET target_id = ?2, target_name = ?3 WHERE rowid = ?1",
            params![playlist_rowid, target_id, target_name],
        )?;
        if changed != 1 {
            bail!("Playlist {} not found", playlist_rowid);
        }
        Ok(())
    }

    fn get_or_create_config(&self) -> Result<Config> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("INSERT OR IGNORE INTO config (singleton) VALUES (1)", [])?;
        let config = tx.query_row(
            "SELECT target_folder_id FROM config WHERE singleton = 1",
            [],
            |r| {
                Ok(Config {
                    target_folder_id: r.get(0)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(config)
    }

    fn set_target_folder(&self, folder_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("INSERT OR IGNORE INTO config (singleton) VALUES (1)", [])?;
        tx.execute(
            "UPDATE config SET target_folder_id = ?1 WHERE singleton = 1",
            params![folder_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_artist(&self, source_id: &str) -> Result<Option<Artist>> {
        let conn = self.conn.lock().unwrap();
        Self::query_artist(&conn, source_id)
    }

    fn get_album(&self, source_id: &str) -> Result<Option<Album>> {
        let conn = self.conn.lock().unwrap();
        Self::query_album(&conn, source_id)
    }

    fn get_song(&self, source_id: &str) -> Result<Option<Song>> {
        let conn = self.conn.lock().unwrap();
        Self::query_song(&conn, source_id)
    }

    fn get_playlist(&self, rowid: i64) -> Result<Option<Playlist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM playlists WHERE rowid = ?1",
            PLAYLIST_COLUMNS
        ))?;
        Ok(stmt
            .query_row(params![rowid], Self::parse_playlist_row)
            .optional()?)
    }

    fn song_artists(&self, song_rowid: i64) -> Result<Vec<Artist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT a.rowid, a.source_id, a.source_name, a.target_id, a.target_name
             FROM artists a
             INNER JOIN song_artists sa ON sa.artist_rowid = a.rowid
             WHERE sa.song_rowid = ?1
             ORDER BY a.rowid",
        )?;
        let artists = stmt
            .query_map(params![song_rowid], Self::parse_artist_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(artists)
    }

    fn playlist_tracks(&self, playlist_rowid: i64) -> Result<Vec<PlaylistTrack>> {
        let conn = self.conn.lock().unwrap();
        Self::query_playlist_tracks(&conn, playlist_rowid)
    }

    fn playlist_track_targets(&self, playlist_rowid: i64) -> Result<Vec<PlaylistTrackTarget>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT pt.position, s.source_id, s.target_id
             FROM playlist_tracks pt
             INNER JOIN songs s ON s.rowid = pt.song_rowid
             WHERE pt.playlist_rowid = ?1
             ORDER BY pt.position",
        )?;
        let tracks = stmt
            .query_map(params![playlist_rowid], |row| {
                Ok(PlaylistTrackTarget {
                    position: row.get(0)?,
                    song_source_id: row.get(1)?,
                    song_target_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn counts(&self) -> Result<LibraryCounts> {
        let conn = self.conn.lock().unwrap();
        Ok(LibraryCounts {
            artists: Self::count(&conn, "SELECT COUNT(*) FROM artists")?,
            albums: Self::count(&conn, "SELECT COUNT(*) FROM albums")?,
            songs: Self::count(&conn, "SELECT COUNT(*) FROM songs")?,
            playlists: Self::count(&conn, "SELECT COUNT(*) FROM playlists")?,
            playlist_tracks: Self::count(&conn, "SELECT COUNT(*) FROM playlist_tracks")?,
        })
    }

    fn pending_work(&self) -> Result<PendingWork> {
        let conn = self.conn.lock().unwrap();
        Ok(PendingWork {
            artists_missing_name: Self::count(
                &conn,
                "SELECT COUNT(*) FROM artists WHERE source_name IS NULL",
            )?,
            albums_missing_upc: Self::count(&conn, "SELECT COUNT(*) FROM albums WHERE upc IS NULL")?,
            albums_missing_target: Self::count(
                &conn,
                "SELECT COUNT(*) FROM albums WHERE target_id IS NULL AND upc IS NOT NULL",
            )?,
            songs_missing_target: Self::count(
                &conn,
                "SELECT COUNT(*) FROM songs WHERE target_id IS NULL AND isrc IS NOT NULL",
            )?,
            songs_without_isrc: Self::count(&conn, "SELECT COUNT(*) FROM songs WHERE isrc IS NULL")?,
            playlists_missing_target: Self::count(
                &conn,
                "SELECT COUNT(*) FROM playlists WHERE target_id IS NULL",
            )?,
        })
    }
}
