//! On-demand derivation of a day's artifacts from the durable log: the raw and refined text
//! exports and the concept tree. Generation only reads the log, so it never interferes with a
//! running daemon. An artifact is written atomically once it is complete; a failed or cancelled
//! run leaves the previous artifact untouched.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, TimeZone};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::{
    config::Settings,
    daemon::storage::activity_storage::ActivityStorage,
    error::GenerateError,
    fs::operations::write_atomically,
    hierarchy::{
        build_concept_tree, cancellable, layer_one_leaves, summarizer::ResilientSummarizer,
        tree::ConceptTree,
    },
    reconstruct::{
        export::{render_raw, render_refined},
        segment_events, TextSegment,
    },
    utils::time::date_to_record_name,
};

use extract::{raw_events_between, TimeRange};

pub mod extract;

/// Directory inside the application directory that holds generated artifacts.
pub const DATA_DIR: &str = "data";

/// Where the artifacts of a day are written.
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn raw_export(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_key_stroke.txt", date_to_record_name(date)))
    }

    pub fn refined_export(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_refined_key_stroke.txt", date_to_record_name(date)))
    }

    pub fn tree(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}_tree.json", date_to_record_name(date)))
    }
}

pub struct Generator<S> {
    storage: S,
    settings: Settings,
    summarizer: ResilientSummarizer,
    artifacts: ArtifactPaths,
}

impl<S: ActivityStorage> Generator<S> {
    pub fn new(
        storage: S,
        settings: Settings,
        summarizer: ResilientSummarizer,
        artifacts: ArtifactPaths,
    ) -> Self {
        Self {
            storage,
            settings,
            summarizer,
            artifacts,
        }
    }

    /// Text segments of the local day `date` in `tz`.
    #[instrument(skip(self, tz))]
    pub async fn segments<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
    ) -> Result<Vec<TextSegment>, GenerateError> {
        let events = raw_events_between(&self.storage, TimeRange::day(date, tz)).await?;
        let segments = segment_events(&events, self.settings.window(), tz);
        if segments.is_empty() {
            return Err(GenerateError::NothingToGenerate { date });
        }
        Ok(segments)
    }

    /// Writes the raw text export of `date`, or the refined one, and returns its path.
    pub async fn export<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
        refined: bool,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, GenerateError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let segments = self.segments(date, tz).await?;

        let (path, content) = if refined {
            let mut texts = Vec::with_capacity(segments.len());
            for segment in &segments {
                texts.push(cancellable(cancel, self.summarizer.refine(&segment.text)).await?);
            }
            (
                self.artifacts.refined_export(date),
                render_refined(&segments, &texts, tz),
            )
        } else {
            (self.artifacts.raw_export(date), render_raw(&segments, tz))
        };

        persist(&path, content.as_bytes()).await?;
        info!("Exported {} segments into {path:?}", segments.len());
        Ok(path)
    }

    /// Builds the concept tree of `date`, writes it and returns it with its path.
    pub async fn tree<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, ConceptTree), GenerateError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let segments = self.segments(date, tz).await?;
        let leaves = layer_one_leaves(&segments, self.settings.leaf_grouping, tz);
        let tree = build_concept_tree(leaves, &self.summarizer, cancel).await?;

        let path = self.artifacts.tree(date);
        let json = tree.to_json().map_err(anyhow::Error::from)?;
        persist(&path, json.as_bytes()).await?;
        info!("Saved a tree of {} nodes into {path:?}", tree.len());
        Ok((path, tree))
    }
}

async fn persist(path: &Path, content: &[u8]) -> Result<(), GenerateError> {
    write_atomically(path, content).await?;
    Ok(())
}
