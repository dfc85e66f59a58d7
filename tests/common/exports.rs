use std::path::{Path, PathBuf};

/// One track row of a playlist export.
#[derive(Clone, Debug)]
pub struct ExportTrack {
    pub track_uri: &'static str,
    pub track_name: &'static str,
    pub artist_uris: &'static str,
    pub artist_names: &'static str,
    pub album_uri: &'static str,
    pub album_name: &'static str,
    pub isrc: &'static str,
}

impl ExportTrack {
    pub fn new(track_uri: &'static str, isrc: &'static str) -> Self {
        Self {
            track_uri,
            track_name: "Track",
            artist_uris: "spotify:artist:solo",
            artist_names: "Solo Artist",
            album_uri: "spotify:album:main",
            album_name: "Main Album",
            isrc,
        }
    }

    pub fn by(mut self, artist_uris: &'static str, artist_names: &'static str) -> Self {
        self.artist_uris = artist_uris;
        self.artist_names = artist_names;
        self
    }
}

/// Write an export file named `file_name` into `dir` and return its path.
pub fn write_export(dir: &Path, file_name: &str, tracks: &[ExportTrack]) -> PathBuf {
    let path = dir.join(file_name);
    let mut writer = csv::Writer::from_path(&path).unwrap();
    writer
        .write_record([
            "Track URI",
            "Track Name",
            "Artist URI(s)",
            "Artist Name(s)",
            "Album URI",
            "Album Name",
            "ISRC",
            "Added At",
        ])
        .unwrap();
    for track in tracks {
        writer
            .write_record([
                track.track_uri,
                track.track_name,
                track.artist_uris,
                track.artist_names,
                track.album_uri,
                track.album_name,
                track.isrc,
                "2023-05-01T10:00:00Z",
            ])
            .unwrap();
    }
    writer.flush().unwrap();
    path
}
