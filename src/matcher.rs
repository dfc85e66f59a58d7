//! Cross-catalog matching by shared identifier.
//!
//! Songs are matched through their ISRC and albums through their UPC. Only rows
//! without a target identity are considered, so a row linked once is never
//! matched again.

use crate::catalog_http::CatalogError;
use crate::library_store::{LibraryStore, TargetLink};
use crate::target_catalog::{TargetAlbum, TargetCatalog, TargetSong, MAX_CODES_PER_REQUEST};
use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchSettings {
    pub song_batch_size: usize,
    pub album_batch_size: usize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            song_batch_size: MAX_CODES_PER_REQUEST,
            album_batch_size: MAX_CODES_PER_REQUEST,
        }
    }
}

/// Outcome of one matching sweep. Counts are in rows unless noted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub considered: usize,
    pub matched: usize,
    /// Rows whose code the target catalog did not return.
    pub unmatched: usize,
    /// Returned records whose code no pending row holds.
    pub lookup_misses: usize,
    /// Returned records dropped because an earlier record had the same code.
    pub ambiguous: usize,
    pub failed_chunks: usize,
    /// Rows left pending because their chunk failed.
    pub failed_rows: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    pub songs: MatchReport,
    pub albums: MatchReport,
}

impl MatchSummary {
    pub fn matched(&self) -> usize {
        self.songs.matched + self.albums.matched
    }
}

/// A target catalog record found through a shared identifier.
trait CodedRecord {
    fn code(&self) -> String;
    fn target_id(&self) -> &str;
    fn link(&self, rowid: i64) -> TargetLink;
}

impl CodedRecord for TargetSong {
    fn code(&self) -> String {
        self.isrc.trim().to_uppercase()
    }

    fn target_id(&self) -> &str {
        &self.id
    }

    fn link(&self, rowid: i64) -> TargetLink {
        TargetLink {
            rowid,
            target_id: self.id.clone(),
            target_name: Some(self.name.clone()),
        }
    }
}

impl CodedRecord for TargetAlbum {
    fn code(&self) -> String {
        self.upc.trim().to_string()
    }

    fn target_id(&self) -> &str {
        &self.id
    }

    fn link(&self, rowid: i64) -> TargetLink {
        TargetLink {
            rowid,
            target_id: self.id.clone(),
            target_name: Some(self.name.clone()),
        }
    }
}

pub struct Matcher<'a> {
    store: &'a dyn LibraryStore,
    catalog: &'a dyn TargetCatalog,
    settings: MatchSettings,
}

impl<'a> Matcher<'a> {
    pub fn new(
        store: &'a dyn LibraryStore,
        catalog: &'a dyn TargetCatalog,
        settings: MatchSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            settings,
        }
    }

    pub fn run(&self) -> Result<MatchSummary> {
        Ok(MatchSummary {
            songs: self.match_songs()?,
            albums: self.match_albums()?,
        })
    }

    pub fn match_songs(&self) -> Result<MatchReport> {
        let pending = self
            .store
            .songs_missing_target()?
            .into_iter()
            .filter_map(|song| Some((song.rowid, song.isrc?.trim().to_uppercase())))
            .collect();

        let report = self.match_by_code(
            "ISRC",
            pending,
            self.settings.song_batch_size,
            |codes| self.catalog.songs_by_isrc(codes),
            |links| self.store.apply_song_matches(links),
        )?;
        log_report("Songs", &report);
        Ok(report)
    }

    pub fn match_albums(&self) -> Result<MatchReport> {
        let pending = self
            .store
            .albums_missing_target()?
            .into_iter()
            .filter_map(|album| Some((album.rowid, album.upc?.trim().to_string())))
            .collect();

        let report = self.match_by_code(
            "UPC",
            pending,
            self.settings.album_batch_size,
            |codes| self.catalog.albums_by_upc(codes),
            |links| self.store.apply_album_matches(links),
        )?;
        log_report("Albums", &report);
        Ok(report)
    }

    /// Look up the distinct codes of `pending` rows in chunks and link every
    /// row holding a returned code. The first record per code wins.
    fn match_by_code<R: CodedRecord>(
        &self,
        code_name: &str,
        pending: Vec<(i64, String)>,
        batch_size: usize,
        lookup: impl Fn(&[String]) -> Result<Vec<R>, CatalogError>,
        apply: impl Fn(&[TargetLink]) -> Result<usize>,
    ) -> Result<MatchReport> {
        let mut report = MatchReport {
            considered: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }

        // Several rows can share a code; each code is looked up once.
        let mut rows_by_code: HashMap<String, Vec<i64>> = HashMap::new();
        let mut codes: Vec<String> = Vec::new();
        for (rowid, code) in pending {
            let rows = rows_by_code.entry(code.clone()).or_default();
            if rows.is_empty() {
                codes.push(code);
            }
            rows.push(rowid);
        }

        info!(
            "Matching {} rows by {} ({} distinct codes)",
            report.considered,
            code_name,
            codes.len()
        );

        let mut linked_codes: HashSet<String> = HashSet::new();
        let chunk_size = batch_size.clamp(1, MAX_CODES_PER_REQUEST);
        for (index, chunk) in codes.chunks(chunk_size).enumerate() {
            let records = match lookup(chunk) {
                Ok(records) => records,
                Err(e) => {
                    warn!("{} lookup failed for chunk {}: {}", code_name, index, e);
                    report.failed_chunks += 1;
                    report.failed_rows += chunk
                        .iter()
                        .map(|code| rows_by_code.get(code).map_or(0, Vec::len))
                        .sum::<usize>();
                    continue;
                }
            };

            let requested: HashSet<&String> = chunk.iter().collect();
            let mut links = Vec::new();
            for record in &records {
                let code = record.code();
                if linked_codes.contains(&code) {
                    warn!(
                        "Ambiguous {} {}: keeping first match, ignoring {}",
                        code_name,
                        code,
                        record.target_id()
                    );
                    report.ambiguous += 1;
                    continue;
                }
                let rows = match rows_by_code.get(&code) {
                    Some(rows) if requested.contains(&code) => rows,
                    _ => {
                        warn!("{} {} returned but not pending locally", code_name, code);
                        report.lookup_misses += 1;
                        continue;
                    }
                };
                links.extend(rows.iter().map(|rowid| record.link(*rowid)));
                linked_codes.insert(code);
            }

            let linked = apply(&links)?;
            report.matched += linked;
            debug!(
                "Chunk {}: {} codes requested, {} records returned, {} rows linked",
                index,
                chunk.len(),
                records.len(),
                linked
            );
        }

        report.unmatched = report
            .considered
            .saturating_sub(report.matched + report.failed_rows);
        Ok(report)
    }
}

fn log_report(label: &str, report: &MatchReport) {
    if report.considered == 0 {
        debug!("{}: nothing to match", label);
        return;
    }
    info!(
        "{} matched: {} of {} ({} unmatched, {} ambiguous, {} lookup misses, {} failed chunks)",
        label,
        report.matched,
        report.considered,
        report.unmatched,
        report.ambiguous,
        report.lookup_misses,
        report.failed_chunks
    );
}
