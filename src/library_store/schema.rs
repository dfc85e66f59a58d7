//! SQLite schema of the migration database.
//!
//! Primary keys are integer rowids; source catalog identities are unique text
//! columns used for lookups and deduplication.

use crate::sqlite_column;
use crate::sqlite_persistence::{ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema};
use anyhow::Result;
use rusqlite::Connection;

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("source_id", &SqlType::Text, non_null = true), // spotify:artist:<id>
        sqlite_column!("source_name", &SqlType::Text),
        sqlite_column!("target_id", &SqlType::Text),
        sqlite_column!("target_name", &SqlType::Text),
    ],
    indices: &[("idx_artists_source_name", "source_name")],
    unique_constraints: &[&["source_id"]],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("source_id", &SqlType::Text, non_null = true), // spotify:album:<id>
        sqlite_column!("source_name", &SqlType::Text, non_null = true),
        sqlite_column!("target_id", &SqlType::Text),
        sqlite_column!("target_name", &SqlType::Text),
        sqlite_column!("upc", &SqlType::Text),
    ],
    indices: &[("idx_albums_upc", "upc")],
    unique_constraints: &[&["source_id"]],
};

const SONGS_TABLE: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("source_id", &SqlType::Text, non_null = true), // spotify:track:<id>
        sqlite_column!("source_name", &SqlType::Text),
        sqlite_column!("target_id", &SqlType::Text),
        sqlite_column!("target_name", &SqlType::Text),
        sqlite_column!("isrc", &SqlType::Text),
        sqlite_column!(
            "album_rowid",
            &SqlType::Integer,
            foreign_key = Some(&ForeignKey {
                foreign_table: "albums",
                foreign_column: "rowid",
                on_delete: ForeignKeyOnChange::SetNull,
            })
        ),
    ],
    indices: &[
        ("idx_songs_isrc", "isrc"),
        ("idx_songs_target_id", "target_id"),
        ("idx_songs_album", "album_rowid"),
    ],
    unique_constraints: &[&["source_id"]],
};

const SONG_ARTISTS_TABLE: Table = Table {
    name: "song_artists",
    columns: &[
        sqlite_column!(
            "song_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "songs",
                foreign_column: "rowid",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "artist_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "artists",
                foreign_column: "rowid",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
    ],
    indices: &[("idx_song_artists_artist", "artist_rowid")],
    unique_constraints: &[&["song_rowid", "artist_rowid"]],
};

const PLAYLISTS_TABLE: Table = Table {
    name: "playlists",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("target_id", &SqlType::Text),
        sqlite_column!("target_name", &SqlType::Text),
        sqlite_column!("import_ref", &SqlType::Text), // path of the export file
    ],
    indices: &[],
    unique_constraints: &[&["import_ref"]],
};

const PLAYLIST_TRACKS_TABLE: Table = Table {
    name: "playlist_tracks",
    columns: &[
        sqlite_column!(
            "playlist_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "playlists",
                foreign_column: "rowid",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "song_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "songs",
                foreign_column: "rowid",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_playlist_tracks_song", "song_rowid")],
    unique_constraints: &[&["playlist_rowid", "position"]],
};

/// Singleton row: the `singleton` column is always 1 and unique.
const CONFIG_TABLE_V0: Table = Table {
    name: "config",
    columns: &[
        sqlite_column!(
            "singleton",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("target_folder_id", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["singleton"]],
};

const CONFIG_TABLE_V1: Table = Table {
    name: "config",
    columns: &[
        sqlite_column!(
            "singleton",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1"),
            check = Some("singleton = 1")
        ),
        sqlite_column!("target_folder_id", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["singleton"]],
};

/// Migration from version 0 to version 1: pin the config singleton to 1.
/// SQLite cannot add a constraint in place, so the table is rebuilt.
fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute("ALTER TABLE config RENAME TO config_v0", [])?;
    CONFIG_TABLE_V1.create(conn)?;
    conn.execute(
        "INSERT INTO config (singleton, target_folder_id)
         SELECT singleton, target_folder_id FROM config_v0 WHERE singleton = 1",
        [],
    )?;
    conn.execute("DROP TABLE config_v0", [])?;
    Ok(())
}

/// All versioned schemas of the migration database.
///
/// Version 0: entity, playlist and config tables
/// Version 1: CHECK constraint on the config singleton
pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            ARTISTS_TABLE,
            ALBUMS_TABLE,
            SONGS_TABLE,
            SONG_ARTISTS_TABLE,
            PLAYLISTS_TABLE,
            PLAYLIST_TRACKS_TABLE,
            CONFIG_TABLE_V0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            ARTISTS_TABLE,
            ALBUMS_TABLE,
            SONGS_TABLE,
            SONG_ARTISTS_TABLE,
            PLAYLISTS_TABLE,
            PLAYLIST_TRACKS_TABLE,
            CONFIG_TABLE_V1,
        ],
        migration: Some(migrate_v0_to_v1),
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::{open_versioned_db, BASE_DB_VERSION};
    use rusqlite::params;

    fn latest() -> &'static VersionedSchema {
        LIBRARY_VERSIONED_SCHEMAS.last().unwrap()
    }

    fn create_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        latest().create(&conn).unwrap();
        conn
    }

    #[test]
    fn test_schema_creates_successfully() {
        let conn = create_db();
        latest().validate(&conn).unwrap();
    }

    #[test]
    fn test_source_id_is_unique() {
        let conn = create_db();
        conn.execute(
            "INSERT INTO artists (source_id) VALUES (?1)",
            params!["spotify:artist:1"],
        )
        .unwrap();
        let duplicate = conn.execute(
            "INSERT INTO artists (source_id) VALUES (?1)",
            params!["spotify:artist:1"],
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_config_rejects_second_row() {
        let conn = create_db();
        conn.execute("INSERT INTO config DEFAULT VALUES", []).unwrap();
        assert!(conn.execute("INSERT INTO config DEFAULT VALUES", []).is_err());
        // A different singleton value is not a way around the unique key.
        assert!(conn
            .execute("INSERT INTO config (singleton) VALUES (2)", [])
            .is_err());
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM config", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_version_0_file_is_migrated() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("library.db");
        {
            let conn = Connection::open(&path).unwrap();
            LIBRARY_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
            conn.execute(
                "INSERT INTO config (singleton, target_folder_id) VALUES (1, 'p.folder')",
                [],
            )
            .unwrap();
            // Accepted before the CHECK constraint existed.
            conn.execute("INSERT INTO config (singleton) VALUES (2)", [])
                .unwrap();
        }

        let conn = open_versioned_db(&path, LIBRARY_VERSIONED_SCHEMAS, "library").unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, (BASE_DB_VERSION + latest().version) as i64);
        let folders: Vec<Option<String>> = conn
            .prepare("SELECT target_folder_id FROM config")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(folders, vec![Some("p.folder".to_string())]);
        assert!(conn
            .execute("UPDATE config SET singleton = 2", [])
            .is_err());
    }

    #[test]
    fn test_playlist_position_is_unique_per_playlist() {
        let conn = create_db();
        conn.execute("INSERT INTO playlists (import_ref) VALUES ('a.csv')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO songs (source_id) VALUES ('spotify:track:1')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO playlist_tracks (playlist_rowid, song_rowid, position) VALUES (1, 1, 0)",
            [],
        )
        .unwrap();
        let same_position = conn.execute(
            "INSERT INTO playlist_tracks (playlist_rowid, song_rowid, position) VALUES (1, 1, 0)",
            [],
        );
        assert!(same_position.is_err());

        // The same song may appear again at another position.
        conn.execute(
            "INSERT INTO playlist_tracks (playlist_rowid, song_rowid, position) VALUES (1, 1, 1)",
            [],
        )
        .unwrap();
    }
}
