use std::fs;
use std::path::{Path, PathBuf};

use engine_logging::{engine_error, engine_info, engine_warn};
use migrator_engine::{ensure_output_dir, AtomicFileWriter, PipelineReport, StageSummary};
use serde::{Deserialize, Serialize};

const LAST_RUN_FILENAME: &str = "last_run.ron";

/// Outcome of the most recent run, kept next to its artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LastRun {
    pub finished_utc: String,
    pub urls: usize,
    pub stages: Vec<StageSummary>,
    pub export_path: PathBuf,
    pub export_rows: usize,
    pub fetch_failures: Vec<String>,
}

impl LastRun {
    pub(crate) fn from_report(report: &PipelineReport, urls: usize, finished_utc: String) -> Self {
        Self {
            finished_utc,
            urls,
            stages: report.summaries(),
            export_path: report.export.output_path.clone(),
            export_rows: report.export.row_count,
            fetch_failures: report
                .fetch
                .failures
                .iter()
                .map(|failure| format!("{}: {}", failure.url, failure.error))
                .collect(),
        }
    }
}

pub(crate) fn load_last_run(output_dir: &Path) -> Option<LastRun> {
    let path = output_dir.join(LAST_RUN_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            engine_warn!("Failed to read last run from {:?}: {}", path, err);
            return None;
        }
    };

    match ron::from_str(&content) {
        Ok(last_run) => Some(last_run),
        Err(err) => {
            engine_warn!("Failed to parse last run from {:?}: {}", path, err);
            None
        }
    }
}

pub(crate) fn save_last_run(output_dir: &Path, last_run: &LastRun) {
    if let Err(err) = ensure_output_dir(output_dir) {
        engine_error!("Failed to ensure output dir {:?}: {}", output_dir, err);
        return;
    }

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(last_run, pretty) {
        Ok(text) => text,
        Err(err) => {
            engine_error!("Failed to serialize last run: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(output_dir.to_path_buf());
    match writer.write(LAST_RUN_FILENAME, &content) {
        Ok(path) => engine_info!("Run summary written to {:?}", path),
        Err(err) => engine_error!("Failed to write run summary to {:?}: {}", output_dir, err),
    }
}
