use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use engine_logging::engine_info;
use log::Level;
use migrator_core::{ContentType, UrlEntry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::{AssetManager, AssetReport, AssetSettings};
use crate::export::{ExportError, ExportOptions, ExportSummary, Exporter};
use crate::fetch::{fetch_all, FetchReport, FetchSettings, Fetcher, ReqwestFetcher};
use crate::image_tools::{FormatConverter, MetadataWriter};
use crate::persist::{ensure_output_dir, AtomicFileWriter, ContentStore, PersistError};
use crate::progress::{report, ProgressSink};
use crate::sanitize::{SanitizeOptions, SanitizeReport, Sanitizer};
use crate::{AssetError, FetchError, Stage, StageSummary, TransformError};

pub const RAW_DIR: &str = "raw";
pub const CLEAN_DIR: &str = "clean";
pub const CLASSIFICATION_REPORT: &str = "classification_report.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub fetch: FetchSettings,
    pub sanitize: SanitizeOptions,
    pub assets: AssetSettings,
    pub export: ExportOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("migration_output"),
            fetch: FetchSettings::default(),
            sanitize: SanitizeOptions::default(),
            assets: AssetSettings::default(),
            export: ExportOptions::default(),
        }
    }
}

/// Failures that stop the run. Per-document problems never end up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no input URLs")]
    NoInputUrls,
    #[error("invalid sanitize configuration: {0}")]
    Config(#[from] TransformError),
    #[error("fetcher setup failed: {0}")]
    Fetcher(#[from] FetchError),
    #[error("asset manager setup failed: {0}")]
    Assets(#[from] AssetError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
    #[error("output error: {0}")]
    Persist(#[from] PersistError),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug)]
pub struct PipelineReport {
    pub fetch: FetchReport,
    pub sanitize: SanitizeReport,
    pub assets: AssetReport,
    pub export: ExportSummary,
}

impl PipelineReport {
    pub fn summaries(&self) -> Vec<StageSummary> {
        vec![
            self.fetch.summary,
            self.sanitize.summary,
            self.assets.summary,
            StageSummary {
                stage: Stage::Export,
                succeeded: self.export.row_count,
                failed: 0,
                skipped: 0,
            },
        ]
    }
}

#[derive(Debug, Serialize)]
struct ClassificationEntry<'a> {
    source_id: &'a str,
    url: &'a str,
    #[serde(rename = "type")]
    content_type: ContentType,
    confidence: u8,
    reason: &'a str,
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Fetch -> sanitize/classify -> assets -> export, in that order.
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    converter: Option<Arc<dyn FormatConverter>>,
    metadata: Option<Arc<dyn MetadataWriter>>,
    clock: Option<Clock>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            fetcher: None,
            converter: None,
            metadata: None,
            clock: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_image_tools(
        mut self,
        converter: Arc<dyn FormatConverter>,
        metadata: Arc<dyn MetadataWriter>,
    ) -> Self {
        self.converter = Some(converter);
        self.metadata = Some(metadata);
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub async fn run(
        self,
        entries: &[UrlEntry],
        sink: &dyn ProgressSink,
    ) -> Result<PipelineReport, PipelineError> {
        if entries.is_empty() {
            return Err(PipelineError::NoInputUrls);
        }
        let output_dir = self.config.output_dir.clone();
        ensure_output_dir(&output_dir)?;
        engine_info!(
            "migrating {} urls into {}",
            entries.len(),
            output_dir.display()
        );

        // Configuration problems surface before any network traffic.
        let mut sanitize_options = self.config.sanitize.clone();
        sanitize_options.classification = sanitize_options.classification.with_type_hints(entries);
        let sanitizer = Sanitizer::new(sanitize_options)?;

        let mut assets = AssetManager::new(self.config.assets.clone(), &output_dir)?;
        if let Some(converter) = self.converter {
            assets = assets.with_converter(converter);
        }
        if let Some(metadata) = self.metadata {
            assets = assets.with_metadata_writer(metadata);
        }

        let mut exporter = Exporter::new(self.config.export.clone());
        if let Some(clock) = self.clock {
            exporter = exporter.with_clock(clock);
        }

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ReqwestFetcher::new(self.config.fetch.clone())?),
        };

        let raw_store = ContentStore::new(output_dir.join(RAW_DIR));
        let clean_store = ContentStore::new(output_dir.join(CLEAN_DIR));

        let fetch = fetch_all(
            entries,
            fetcher.as_ref(),
            &self.config.fetch,
            Some(&raw_store),
            sink,
        )
        .await;

        let sanitize = sanitizer.sanitize_all(&fetch.documents, Some(&clean_store), sink);
        write_classification_report(&output_dir, &sanitize, sink)?;

        let assets = assets.process(&fetch.documents, sink).await;

        let export = exporter.export(
            &sanitize.documents,
            &fetch.documents,
            &assets.records,
            &output_dir,
            sink,
        )?;

        Ok(PipelineReport {
            fetch,
            sanitize,
            assets,
            export,
        })
    }
}

fn write_classification_report(
    output_dir: &std::path::Path,
    sanitize: &SanitizeReport,
    sink: &dyn ProgressSink,
) -> Result<(), PipelineError> {
    let entries: Vec<ClassificationEntry> = sanitize
        .documents
        .iter()
        .map(|doc| ClassificationEntry {
            source_id: &doc.source_id,
            url: &doc.url,
            content_type: doc.verdict.content_type,
            confidence: doc.verdict.confidence,
            reason: &doc.verdict.reason,
        })
        .collect();
    let json = serde_json::to_string_pretty(&entries)
        .map_err(|e| PipelineError::Serialization(e.to_string()))?;
    let path = AtomicFileWriter::new(output_dir.to_path_buf()).write(CLASSIFICATION_REPORT, &json)?;
    let posts = entries
        .iter()
        .filter(|e| e.content_type == ContentType::Post)
        .count();
    report(
        sink,
        Level::Info,
        Stage::Sanitize,
        format!(
            "classified {} posts and {} pages ({})",
            posts,
            entries.len() - posts,
            path.display()
        ),
    );
    Ok(())
}
