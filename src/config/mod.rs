mod file_config;

pub use file_config::{BackfillConfig, FileConfig, MatchingConfig, ReplicationConfig};

use crate::backfill::BackfillSettings;
use crate::matcher::MatchSettings;
use crate::pipeline::PipelineSettings;
use crate::replicator::ReplicatorSettings;
use crate::source_catalog::{SpotifyCredentials, MAX_ALBUMS_PER_REQUEST, MAX_ARTISTS_PER_REQUEST};
use crate::target_catalog::{AppleMusicCredentials, MAX_CODES_PER_REQUEST};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: PathBuf,
    pub storefront: String,
    pub locale: String,
    pub request_timeout_sec: u64,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub apple_developer_token: Option<String>,
    pub apple_music_user_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub storefront: String,
    pub locale: String,
    pub request_timeout: Duration,

    pub backfill: BackfillSettings,
    pub matching: MatchSettings,
    pub replication: ReplicatorSettings,

    // Credentials only come from the environment or the command line.
    pub spotify: Option<SpotifyCredentials>,
    pub apple_music: Option<AppleMusicCredentials>,
}

fn batch_size(value: Option<usize>, max: usize, name: &str) -> Result<usize> {
    match value {
        None => Ok(max),
        Some(0) => bail!("{} must be greater than zero", name),
        Some(size) if size > max => bail!("{} must be at most {}, got {}", name, max, size),
        Some(size) => Ok(size),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.db_path.clone());
        if db_path.as_os_str().is_empty() {
            bail!("db_path must be specified via --db or in config file");
        }
        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }

        let storefront = file.storefront.unwrap_or_else(|| cli.storefront.clone());
        let locale = file.locale.unwrap_or_else(|| cli.locale.clone());
        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);
        if request_timeout_sec == 0 {
            bail!("request_timeout_sec must be greater than zero");
        }

        let backfill_file = file.backfill.unwrap_or_default();
        let backfill = BackfillSettings {
            artist_batch_size: batch_size(
                backfill_file.artist_batch_size,
                MAX_ARTISTS_PER_REQUEST,
                "backfill.artist_batch_size",
            )?,
            album_batch_size: batch_size(
                backfill_file.album_batch_size,
                MAX_ALBUMS_PER_REQUEST,
                "backfill.album_batch_size",
            )?,
        };

        let matching_file = file.matching.unwrap_or_default();
        let matching = MatchSettings {
            song_batch_size: batch_size(
                matching_file.song_batch_size,
                MAX_CODES_PER_REQUEST,
                "matching.song_batch_size",
            )?,
            album_batch_size: batch_size(
                matching_file.album_batch_size,
                MAX_CODES_PER_REQUEST,
                "matching.album_batch_size",
            )?,
        };

        let replication_file = file.replication.unwrap_or_default();
        let defaults = ReplicatorSettings::default();
        let replication = ReplicatorSettings {
            folder_name: replication_file
                .folder_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(defaults.folder_name),
            create_empty_playlists: replication_file
                .create_empty_playlists
                .unwrap_or(defaults.create_empty_playlists),
        };

        let spotify = match (
            non_blank(&cli.spotify_client_id),
            non_blank(&cli.spotify_client_secret),
        ) {
            (Some(client_id), Some(client_secret)) => Some(SpotifyCredentials {
                client_id,
                client_secret,
            }),
            _ => None,
        };
        let apple_music = match (
            non_blank(&cli.apple_developer_token),
            non_blank(&cli.apple_music_user_token),
        ) {
            (Some(developer_token), Some(user_token)) => Some(AppleMusicCredentials {
                developer_token,
                user_token,
            }),
            _ => None,
        };

        Ok(AppConfig {
            db_path,
            storefront,
            locale,
            request_timeout: Duration::from_secs(request_timeout_sec),
            backfill,
            matching,
            replication,
            spotify,
            apple_music,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            backfill: self.backfill.clone(),
            matching: self.matching.clone(),
            replication: self.replication.clone(),
        }
    }

    pub fn require_spotify(&self) -> Result<&SpotifyCredentials> {
        match &self.spotify {
            Some(credentials) => Ok(credentials),
            None => bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set"),
        }
    }

    pub fn require_apple_music(&self) -> Result<&AppleMusicCredentials> {
        match &self.apple_music {
            Some(credentials) => Ok(credentials),
            None => bail!("APPLE_DEVELOPER_TOKEN and APPLE_MUSIC_USER_TOKEN must be set"),
        }
    }
}
