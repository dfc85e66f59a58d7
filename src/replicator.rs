//! Recreates imported playlists in the target catalog.
//!
//! Every playlist without a target identity becomes one library playlist
//! inside a shared folder, with its matched tracks in source order. The folder
//! is created the first time it is needed and its id is kept in the store's
//! config row, so later runs reuse it.

use crate::catalog_http::CatalogError;
use crate::library_store::{LibraryStore, Playlist};
use crate::target_catalog::{NewPlaylist, TargetCatalog};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const FALLBACK_NAME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum ReplicatorError {
    #[error("Failed to create playlist folder {name:?}: {source}")]
    FolderCreation {
        name: String,
        #[source]
        source: CatalogError,
    },

    #[error("Library store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicatorSettings {
    pub folder_name: String,
    pub create_empty_playlists: bool,
}

impl Default for ReplicatorSettings {
    fn default() -> Self {
        Self {
            folder_name: "Migrated Playlists".to_string(),
            create_empty_playlists: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedPlaylist {
    pub playlist_rowid: i64,
    pub name: String,
    /// HTTP status of the rejected request, when the catalog answered.
    pub status: Option<u16>,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    pub considered: usize,
    pub created: usize,
    pub failed: Vec<FailedPlaylist>,
    /// Playlists left unlinked because none of their tracks is matched yet
    /// and empty playlists are disabled.
    pub skipped_empty: usize,
    pub tracks_included: usize,
    /// Tracks left out because their song has no target identity.
    pub tracks_omitted: usize,
    pub folder_created: bool,
}

/// A playlist ready to be sent to the target catalog.
struct PlaylistPlan {
    playlist: Playlist,
    name: String,
    track_ids: Vec<String>,
    omitted: usize,
}

/// Display name derived from the import reference: the file stem with `_`
/// and `-` read as spaces, each word capitalized. Falls back to `now`.
pub fn derive_playlist_name(import_ref: Option<&str>, now: DateTime<Local>) -> String {
    let stem = import_ref
        .and_then(|r| Path::new(r).file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let words: Vec<String> = stem
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect();

    if words.is_empty() {
        now.format(FALLBACK_NAME_FORMAT).to_string()
    } else {
        words.join(" ")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn playlist_description(now: DateTime<Local>) -> String {
    format!("Migrated on {}", now.format("%Y-%m-%d %H:%M"))
}

pub struct PlaylistReplicator<'a> {
    store: &'a dyn LibraryStore,
    catalog: &'a dyn TargetCatalog,
    settings: ReplicatorSettings,
}

impl<'a> PlaylistReplicator<'a> {
    pub fn new(
        store: &'a dyn LibraryStore,
        catalog: &'a dyn TargetCatalog,
        settings: ReplicatorSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            settings,
        }
    }

    pub fn run(&self) -> Result<ReplicationReport, ReplicatorError> {
        self.run_at(Local::now())
    }

    /// Replicate pending playlists, stamping names and descriptions with `now`.
    pub fn run_at(&self, now: DateTime<Local>) -> Result<ReplicationReport, ReplicatorError> {
        let pending = self.store.playlists_missing_target()?;
        let mut report = ReplicationReport {
            considered: pending.len(),
            ..Default::default()
        };

        let mut plans = Vec::new();
        for playlist in pending {
            let plan = self.plan(playlist, now)?;
            if plan.track_ids.is_empty() && !self.settings.create_empty_playlists {
                debug!(
                    "Skipping playlist {:?}: no matched tracks ({} pending)",
                    plan.name, plan.omitted
                );
                report.skipped_empty += 1;
                continue;
            }
            plans.push(plan);
        }

        if plans.is_empty() {
            debug!("No playlists to replicate");
            return Ok(report);
        }

        let folder_id = self.ensure_folder(&mut report)?;
        let description = playlist_description(now);

        for plan in plans {
            let request = NewPlaylist {
                name: plan.name.clone(),
                description: description.clone(),
                is_public: false,
                parent_folder_id: folder_id.clone(),
                track_ids: plan.track_ids,
            };

            match self.catalog.create_playlist(&request) {
                Ok(target_id) => {
                    self.store
                        .link_playlist(plan.playlist.rowid, &target_id, &plan.name)?;
                    info!(
                        "Created playlist {:?} ({}) with {} tracks, {} omitted",
                        plan.name,
                        target_id,
                        request.track_ids.len(),
                        plan.omitted
                    );
                    report.created += 1;
                    report.tracks_included += request.track_ids.len();
                    report.tracks_omitted += plan.omitted;
                }
                Err(e) => {
                    error!("Failed to create playlist {:?}: {}", plan.name, e);
                    report.failed.push(FailedPlaylist {
                        playlist_rowid: plan.playlist.rowid,
                        name: plan.name,
                        status: e.status(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !report.failed.is_empty() {
            warn!(
                "{} playlists failed and will be retried on the next run",
                report.failed.len()
            );
        }
        Ok(report)
    }

    fn plan(&self, playlist: Playlist, now: DateTime<Local>) -> Result<PlaylistPlan, ReplicatorError> {
        let name = derive_playlist_name(playlist.import_ref.as_deref(), now);
        let tracks = self.store.playlist_track_targets(playlist.rowid)?;
        let total = tracks.len();
        let track_ids: Vec<String> = tracks
            .into_iter()
            .filter_map(|track| track.song_target_id)
            .collect();
        Ok(PlaylistPlan {
            playlist,
            name,
            omitted: total - track_ids.len(),
            track_ids,
        })
    }

    /// Target folder id from config, creating the folder when none is recorded.
    fn ensure_folder(&self, report: &mut ReplicationReport) -> Result<String, ReplicatorError> {
        if let Some(folder_id) = self.store.get_or_create_config()?.target_folder_id {
            return Ok(folder_id);
        }

        let folder_id = self
            .catalog
            .create_folder(&self.settings.folder_name)
            .map_err(|source| ReplicatorError::FolderCreation {
                name: self.settings.folder_name.clone(),
                source,
            })?;
        self.store.set_target_folder(&folder_id)?;
        info!(
            "Created playlist folder {:?} ({})",
            self.settings.folder_name, folder_id
        );
        report.folder_created = true;
        Ok(folder_id)
    }
}
