use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use log::Level;
use migrator_core::{export_slug, fallback_title, ContentType};
use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::assets::resolve_image_url;
use crate::dates::{extract_published_date, DATE_FORMAT};
use crate::dom::{self, DomElement};
use crate::persist::{AtomicFileWriter, PersistError};
use crate::progress::{complete, report, ProgressSink};
use crate::selector::builtin;
use crate::{CleanDocument, ExportRow, ImageRecord, RawDocument, Stage, StageSummary};

pub const CSV_HEADER: [&str; 8] = [
    "title", "content", "type", "status", "date", "slug", "excerpt", "category",
];

const TITLE_SELECTORS: &[&str] = &["h1.entry-title", "h1.post-title", "article h1", "h1"];
const TITLE_SUFFIX_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — "];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub output_filename: String,
    /// Per-row summary written next to the export file.
    pub manifest_filename: Option<String>,
    pub status: String,
    /// Category for posts. Pages never get one.
    pub default_category: String,
    /// Prefix for rewritten image references.
    pub image_base_url: String,
    pub excerpt_length: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output_filename: "export.csv".to_string(),
            manifest_filename: Some("export_manifest.json".to_string()),
            status: "publish".to_string(),
            default_category: "Uncategorized".to_string(),
            image_base_url: "/wp-content/uploads/migrated".to_string(),
            excerpt_length: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub row_count: usize,
    pub posts: usize,
    pub pages: usize,
    pub output_path: PathBuf,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no documents to export")]
    NoInputDocuments,
    #[error("serialization failed: {0}")]
    SerializationFailure(String),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
struct ManifestEntry<'a> {
    source_id: &'a str,
    url: &'a str,
    slug: &'a str,
    title: &'a str,
    #[serde(rename = "type")]
    content_type: ContentType,
    confidence: u8,
    reason: &'a str,
    date: &'a str,
    images: usize,
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Builds import rows from clean documents and writes the export file.
pub struct Exporter {
    options: ExportOptions,
    clock: Clock,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the time source used for documents without a date.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// One row for `clean`. Title and date come from `raw` when available.
    pub fn build_row(
        &self,
        clean: &CleanDocument,
        raw: Option<&RawDocument>,
        images: &[&ImageRecord],
    ) -> ExportRow {
        let source = Html::parse_document(raw.map(|r| r.html.as_str()).unwrap_or(&clean.html));
        let title = extract_title(&source).unwrap_or_else(|| fallback_title(&clean.source_id));
        let date = extract_published_date(&source)
            .unwrap_or_else(|| (self.clock)())
            .format(DATE_FORMAT)
            .to_string();
        let content_type = clean.content_type();
        let category = match content_type {
            ContentType::Post => self.options.default_category.clone(),
            ContentType::Page => String::new(),
        };

        ExportRow {
            slug: export_slug(&clean.source_id, &title),
            title,
            content: self.rewrite_image_sources(clean, images),
            excerpt: extract_excerpt(&clean.html, self.options.excerpt_length),
            content_type,
            status: self.options.status.clone(),
            date,
            category,
        }
    }

    /// Build every row, write the export file (and manifest), report the
    /// stage summary.
    pub fn export(
        &self,
        clean: &[CleanDocument],
        raw: &[RawDocument],
        records: &[ImageRecord],
        output_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<ExportSummary, ExportError> {
        if clean.is_empty() {
            return Err(ExportError::NoInputDocuments);
        }
        let raw_by_id: HashMap<&str, &RawDocument> =
            raw.iter().map(|doc| (doc.source_id.as_str(), doc)).collect();
        let mut images_by_id: HashMap<&str, Vec<&ImageRecord>> = HashMap::new();
        for record in records.iter().filter(|r| r.is_available()) {
            images_by_id
                .entry(record.source_id.as_str())
                .or_default()
                .push(record);
        }

        let mut summary = StageSummary::new(Stage::Export);
        let mut rows = Vec::with_capacity(clean.len());
        for doc in clean {
            let images = images_by_id
                .get(doc.source_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let row = self.build_row(doc, raw_by_id.get(doc.source_id.as_str()).copied(), images);
            report(
                sink,
                Level::Debug,
                Stage::Export,
                format!("{} -> {} ({})", doc.source_id, row.slug, row.content_type),
            );
            rows.push(row);
            summary.succeeded += 1;
        }

        let writer = AtomicFileWriter::new(output_dir.to_path_buf());
        let output_path = writer.write(&self.options.output_filename, &serialize_rows(&rows))?;

        let manifest_path = match &self.options.manifest_filename {
            Some(name) => {
                let entries: Vec<ManifestEntry> = clean
                    .iter()
                    .zip(&rows)
                    .map(|(doc, row)| ManifestEntry {
                        source_id: &doc.source_id,
                        url: &doc.url,
                        slug: &row.slug,
                        title: &row.title,
                        content_type: row.content_type,
                        confidence: doc.verdict.confidence,
                        reason: &doc.verdict.reason,
                        date: &row.date,
                        images: images_by_id
                            .get(doc.source_id.as_str())
                            .map(Vec::len)
                            .unwrap_or(0),
                    })
                    .collect();
                let json = serde_json::to_string_pretty(&entries)
                    .map_err(|e| ExportError::SerializationFailure(e.to_string()))?;
                Some(writer.write(name, &json)?)
            }
            None => None,
        };

        let posts = rows
            .iter()
            .filter(|row| row.content_type == ContentType::Post)
            .count();
        report(
            sink,
            Level::Info,
            Stage::Export,
            format!(
                "wrote {} rows ({} posts, {} pages) to {}",
                rows.len(),
                posts,
                rows.len() - posts,
                output_path.display()
            ),
        );
        complete(sink, summary);

        Ok(ExportSummary {
            row_count: rows.len(),
            posts,
            pages: rows.len() - posts,
            output_path,
            manifest_path,
        })
    }

    fn rewrite_image_sources(&self, clean: &CleanDocument, images: &[&ImageRecord]) -> String {
        if images.is_empty() {
            return clean.html.clone();
        }
        let base = Url::parse(&clean.url).ok();
        let by_url: HashMap<&str, &ImageRecord> = images
            .iter()
            .map(|record| (record.original_url.as_str(), *record))
            .collect();
        let prefix = self.options.image_base_url.trim_end_matches('/');

        let mut nodes = dom::parse_fragment(&clean.html);
        dom::walk_mut(&mut nodes, &mut |el: &mut DomElement| {
            if !el.is("img") {
                return;
            }
            let resolved = el
                .attr("src")
                .and_then(|src| resolve_image_url(src, base.as_ref()));
            let Some(record) = resolved.and_then(|url| by_url.get(url.as_str()).copied()) else {
                return;
            };
            let local = if prefix.is_empty() {
                record.local_filename.clone()
            } else {
                format!("{prefix}/{}", record.local_filename)
            };
            el.set_attr("src", local);
        });
        dom::serialize(&nodes)
    }
}

/// First non-empty title candidate: headings, then `og:title`, then
/// `<title>` without its site suffix.
pub fn extract_title(document: &Html) -> Option<String> {
    for spec in TITLE_SELECTORS {
        let Some(selector) = builtin(spec) else {
            continue;
        };
        let found = document
            .select(&selector)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|text| !text.is_empty());
        if found.is_some() {
            return found;
        }
    }

    let og_title = builtin(r#"meta[property="og:title"]"#).and_then(|selector| {
        document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(collapse_whitespace)
            .find(|text| !text.is_empty())
    });
    if og_title.is_some() {
        return og_title;
    }

    builtin("title").and_then(|selector| {
        document
            .select(&selector)
            .map(|el| strip_site_suffix(&collapse_whitespace(&el.text().collect::<String>())))
            .find(|text| !text.is_empty())
    })
}

/// `Best Trucks | Joe's Towing` -> `Best Trucks`. Only the last suffix goes.
fn strip_site_suffix(title: &str) -> String {
    let cut = TITLE_SUFFIX_SEPARATORS
        .iter()
        .filter_map(|sep| title.rfind(sep))
        .max();
    match cut {
        Some(pos) if !title[..pos].trim().is_empty() => title[..pos].trim().to_string(),
        _ => title.to_string(),
    }
}

/// Plain text of the first non-empty paragraph, cut at `max_chars` with
/// `...` appended when cut.
pub fn extract_excerpt(html: &str, max_chars: usize) -> String {
    let Some(selector) = builtin("p") else {
        return String::new();
    };
    let fragment = Html::parse_fragment(html);
    let Some(text) = fragment
        .select(&selector)
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .find(|text| !text.is_empty())
    else {
        return String::new();
    };
    if text.chars().count() <= max_chars {
        return text;
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Quote a field, doubling embedded quotes.
pub fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Header plus one line per row, every field quoted, CRLF line endings.
pub fn serialize_rows(rows: &[ExportRow]) -> String {
    let mut out = String::new();
    push_record(&mut out, CSV_HEADER.iter().copied());
    for row in rows {
        push_record(
            &mut out,
            [
                row.title.as_str(),
                row.content.as_str(),
                row.content_type.as_str(),
                row.status.as_str(),
                row.date.as_str(),
                row.slug.as_str(),
                row.excerpt.as_str(),
                row.category.as_str(),
            ]
            .into_iter(),
        );
    }
    out
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let line = fields.map(csv_field).collect::<Vec<_>>().join(",");
    out.push_str(&line);
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(csv_field(r#"He said "hi""#), r#""He said ""hi""""#);
    }

    #[test]
    fn site_suffix_is_removed_once() {
        assert_eq!(strip_site_suffix("Best Trucks | Joe's Towing"), "Best Trucks");
        assert_eq!(strip_site_suffix("A - B | Site"), "A - B");
        assert_eq!(strip_site_suffix("| Site"), "| Site");
    }

    #[test]
    fn title_prefers_entry_heading() {
        let doc = Html::parse_document(
            r#"<head><title>Doc | Site</title></head><body><h1>Other</h1><h1 class="entry-title"> Real
            Title </h1></body>"#,
        );
        assert_eq!(extract_title(&doc).as_deref(), Some("Real Title"));
    }

    #[test]
    fn excerpt_is_truncated_with_ellipsis() {
        let long = "word ".repeat(60);
        let excerpt = extract_excerpt(&format!("<p> </p><p>{long}</p>"), 150);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 153);
        assert_eq!(extract_excerpt("<p>Short one.</p>", 150), "Short one.");
    }
}
