use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub storefront: Option<String>,
    pub locale: Option<String>,
    pub request_timeout_sec: Option<u64>,

    // Stage configs
    pub backfill: Option<BackfillConfig>,
    pub matching: Option<MatchingConfig>,
    pub replication: Option<ReplicationConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackfillConfig {
    pub artist_batch_size: Option<usize>,
    pub album_batch_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MatchingConfig {
    pub song_batch_size: Option<usize>,
    pub album_batch_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Name of the target folder holding migrated playlists.
    pub folder_name: Option<String>,
    pub create_empty_playlists: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
