use std::fmt;

use migrator_core::{ClassificationVerdict, ContentType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Sanitize,
    Assets,
    Export,
}

impl Stage {
    /// Log target used when a stage message reaches the `log` facade.
    pub fn target(self) -> &'static str {
        match self {
            Stage::Fetch => "migrator::fetch",
            Stage::Sanitize => "migrator::sanitize",
            Stage::Assets => "migrator::assets",
            Stage::Export => "migrator::export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Sanitize => "sanitize",
            Stage::Assets => "assets",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// Completion counts for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StageSummary {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} succeeded, {} failed, {} skipped",
            self.stage, self.succeeded, self.failed, self.skipped
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Log {
        level: log::Level,
        stage: Stage,
        message: String,
    },
    StageCompleted(StageSummary),
}

/// Page markup as fetched. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Derived from the requested URL.
    pub source_id: String,
    /// Where the page was served from after redirects; relative references
    /// resolve against it.
    pub url: String,
    pub html: String,
    /// RFC 3339
    pub fetched_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanDocument {
    pub source_id: String,
    pub url: String,
    pub html: String,
    pub verdict: ClassificationVerdict,
}

impl CleanDocument {
    pub fn content_type(&self) -> ContentType {
        self.verdict.content_type
    }
}

/// One image reference found in a raw document, and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub original_url: String,
    pub local_filename: String,
    pub article_slug: String,
    pub source_id: String,
    pub size_bytes: u64,
    pub alt_text: String,
    pub skipped: bool,
    pub format_converted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_format: Option<String>,
    pub metadata_embedded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageRecord {
    /// True when the file exists locally and can replace the original reference.
    pub fn is_available(&self) -> bool {
        !self.skipped && self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub content_type: ContentType,
    pub status: String,
    pub date: String,
    pub category: String,
}
