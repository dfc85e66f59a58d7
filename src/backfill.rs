//! Source-side metadata backfill.
//!
//! Two independent sweeps fill what exports leave out: display names of
//! artists that only appeared on multi-artist rows, and album UPCs. Each sweep
//! selects the rows still missing the field, looks them up in chunks against
//! the source catalog, and writes the values back one transaction per chunk.
//! A failing chunk does not stop its siblings; whatever stays null is picked up
//! by the next run.

use crate::catalog_http::CatalogError;
use crate::library_store::{ApplyOutcome, LibraryStore, SourceFieldUpdate};
use crate::source_catalog::{SourceCatalog, MAX_ALBUMS_PER_REQUEST, MAX_ARTISTS_PER_REQUEST};
use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackfillSettings {
    pub artist_batch_size: usize,
    pub album_batch_size: usize,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            artist_batch_size: MAX_ARTISTS_PER_REQUEST,
            album_batch_size: MAX_ALBUMS_PER_REQUEST,
        }
    }
}

/// Outcome of one backfill sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Rows that were missing the field when the sweep started.
    pub considered: usize,
    /// Records the source catalog returned.
    pub returned: usize,
    pub applied: usize,
    /// Returned records with no local row.
    pub unknown: usize,
    /// Rows still missing the field after the sweep.
    pub unresolved: usize,
    pub failed_chunks: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub artist_names: BackfillReport,
    pub album_upcs: BackfillReport,
}

impl BackfillSummary {
    pub fn applied(&self) -> usize {
        self.artist_names.applied + self.album_upcs.applied
    }
}

pub struct BackfillResolver<'a> {
    store: &'a dyn LibraryStore,
    catalog: &'a dyn SourceCatalog,
    settings: BackfillSettings,
}

impl<'a> BackfillResolver<'a> {
    pub fn new(
        store: &'a dyn LibraryStore,
        catalog: &'a dyn SourceCatalog,
        settings: BackfillSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            settings,
        }
    }

    pub fn run(&self) -> Result<BackfillSummary> {
        Ok(BackfillSummary {
            artist_names: self.backfill_artist_names()?,
            album_upcs: self.backfill_album_upcs()?,
        })
    }

    pub fn backfill_artist_names(&self) -> Result<BackfillReport> {
        let pending: Vec<String> = self
            .store
            .artists_missing_name()?
            .into_iter()
            .map(|artist| artist.source_id)
            .collect();

        let report = self.sweep(
            "artist names",
            &pending,
            self.settings
                .artist_batch_size
                .clamp(1, MAX_ARTISTS_PER_REQUEST),
            |ids| {
                Ok(self
                    .catalog
                    .get_artists(ids)?
                    .into_iter()
                    .map(|artist| SourceFieldUpdate {
                        source_id: artist.source_id,
                        value: artist.name,
                    })
                    .collect())
            },
            |updates| self.store.apply_artist_names(updates),
        )?;
        log_report("artist names", &report);
        Ok(report)
    }

    pub fn backfill_album_upcs(&self) -> Result<BackfillReport> {
        let pending: Vec<String> = self
            .store
            .albums_missing_upc()?
            .into_iter()
            .map(|album| album.source_id)
            .collect();

        let report = self.sweep(
            "album UPCs",
            &pending,
            self.settings
                .album_batch_size
                .clamp(1, MAX_ALBUMS_PER_REQUEST),
            |ids| {
                let albums = self.catalog.get_albums(ids)?;
                let mut updates = Vec::with_capacity(albums.len());
                for album in albums {
                    match album.upc {
                        Some(upc) => updates.push(SourceFieldUpdate {
                            source_id: album.source_id,
                            value: upc,
                        }),
                        None => debug!("Album {} has no UPC in the source catalog", album.source_id),
                    }
                }
                Ok(updates)
            },
            |updates| self.store.apply_album_upcs(updates),
        )?;
        log_report("album UPCs", &report);
        Ok(report)
    }

    /// Chunk `pending`, look each chunk up and apply what comes back. Catalog
    /// errors fail the chunk only; store errors abort the sweep.
    fn sweep(
        &self,
        label: &str,
        pending: &[String],
        chunk_size: usize,
        lookup: impl Fn(&[String]) -> Result<Vec<SourceFieldUpdate>, CatalogError>,
        apply: impl Fn(&[SourceFieldUpdate]) -> Result<ApplyOutcome>,
    ) -> Result<BackfillReport> {
        let mut report = BackfillReport {
            considered: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }

        info!("Backfilling {} for {} rows", label, pending.len());

        for (index, chunk) in pending.chunks(chunk_size).enumerate() {
            let updates = match lookup(chunk) {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("Backfill of {} failed for chunk {}: {}", label, index, e);
                    report.failed_chunks += 1;
                    continue;
                }
            };
            report.returned += updates.len();

            let outcome = apply(&updates)?;
            for source_id in &outcome.unknown {
                warn!("Source catalog returned {} with no local row", source_id);
            }
            report.applied += outcome.applied;
            report.unknown += outcome.unknown.len();
            debug!(
                "Chunk {}: {} requested, {} returned, {} applied",
                index,
                chunk.len(),
                updates.len(),
                outcome.applied
            );
        }

        report.unresolved = report.considered.saturating_sub(report.applied);
        Ok(report)
    }
}

fn log_report(label: &str, report: &BackfillReport) {
    if report.considered == 0 {
        debug!("No rows missing {}", label);
        return;
    }
    info!(
        "Backfill of {} complete: {} applied, {} unresolved, {} unknown, {} failed chunks",
        label, report.applied, report.unresolved, report.unknown, report.failed_chunks
    );
}
