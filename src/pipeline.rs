//! Runs the migration stages in order: import, backfill, match, replicate.
//!
//! Each stage only touches rows still missing what it produces, so running the
//! whole pipeline again after a partial failure picks up where the last run
//! stopped.

use crate::backfill::{BackfillResolver, BackfillSettings, BackfillSummary};
use crate::importer::{self, ImportReport};
use crate::library_store::{LibraryStore, PendingWork};
use crate::matcher::{MatchSettings, MatchSummary, Matcher};
use crate::replicator::{PlaylistReplicator, ReplicationReport, ReplicatorSettings};
use crate::source_catalog::SourceCatalog;
use crate::target_catalog::TargetCatalog;
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Stage {
    Import,
    Backfill,
    Match,
    Replicate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Import => "import",
            Stage::Backfill => "backfill",
            Stage::Match => "match",
            Stage::Replicate => "replicate",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    pub backfill: BackfillSettings,
    pub matching: MatchSettings,
    pub replication: ReplicatorSettings,
}

/// Per-stage reports of one pipeline run. A stage that did not run has no
/// report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub import: Option<ImportReport>,
    pub backfill: Option<BackfillSummary>,
    pub matching: Option<MatchSummary>,
    pub replication: Option<ReplicationReport>,
    pub pending: PendingWork,
}

impl PipelineReport {
    pub fn stages_run(&self) -> Vec<Stage> {
        let mut stages = Vec::new();
        if self.import.is_some() {
            stages.push(Stage::Import);
        }
        if self.backfill.is_some() {
            stages.push(Stage::Backfill);
        }
        if self.matching.is_some() {
            stages.push(Stage::Match);
        }
        if self.replication.is_some() {
            stages.push(Stage::Replicate);
        }
        stages
    }
}

pub struct Pipeline<'a> {
    store: &'a dyn LibraryStore,
    source: &'a dyn SourceCatalog,
    target: &'a dyn TargetCatalog,
    settings: PipelineSettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a dyn LibraryStore,
        source: &'a dyn SourceCatalog,
        target: &'a dyn TargetCatalog,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            source,
            target,
            settings,
        }
    }

    /// Import `exports` (if any), then run every later stage.
    pub fn run(&self, exports: &[PathBuf]) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        if !exports.is_empty() {
            info!("Stage {}: {} paths", Stage::Import, exports.len());
            report.import = Some(importer::import_paths(self.store, exports)?);
        }

        info!("Stage {}", Stage::Backfill);
        report.backfill = Some(
            BackfillResolver::new(self.store, self.source, self.settings.backfill.clone()).run()?,
        );

        info!("Stage {}", Stage::Match);
        report.matching =
            Some(Matcher::new(self.store, self.target, self.settings.matching.clone()).run()?);

        info!("Stage {}", Stage::Replicate);
        report.replication = Some(
            PlaylistReplicator::new(
                self.store,
                self.target,
                self.settings.replication.clone(),
            )
            .run()?,
        );

        report.pending = self.store.pending_work()?;
        info!(
            "Pipeline complete: {} songs and {} playlists still pending",
            report.pending.songs_missing_target, report.pending.playlists_missing_target
        );
        Ok(report)
    }
}
