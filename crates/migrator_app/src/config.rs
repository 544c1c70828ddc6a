use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use engine_logging::engine_info;
use migrator_engine::{ClassificationConfig, PipelineConfig};

/// Pipeline settings from an optional RON file, then the JSON classification
/// and link tables layered over the sanitize section.
pub(crate) fn resolve(
    config: Option<&Path>,
    classification: Option<&Path>,
    links: Option<&Path>,
) -> Result<PipelineConfig> {
    let mut resolved = match config {
        Some(path) => load_pipeline_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(path) = classification {
        resolved.sanitize.classification = load_classification(path)?;
    }
    if let Some(path) = links {
        resolved.sanitize.link_rewrites = load_link_rewrites(path)?;
    }
    Ok(resolved)
}

pub(crate) fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let text = read(path)?;
    let config = ron::from_str(&text)
        .with_context(|| format!("invalid pipeline config {}", path.display()))?;
    engine_info!("Loaded pipeline config from {:?}", path);
    Ok(config)
}

pub(crate) fn load_classification(path: &Path) -> Result<ClassificationConfig> {
    let text = read(path)?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid classification config {}", path.display()))
}

/// `{ "<substring>": "<new path>" }`
pub(crate) fn load_link_rewrites(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = read(path)?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid link rewrite table {}", path.display()))
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))
}
