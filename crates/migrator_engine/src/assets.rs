use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use log::Level;
use migrator_core::{article_slug, local_image_filename, url_extension};
use reqwest::header::CONTENT_TYPE;
use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fetch::DEFAULT_USER_AGENT;
use crate::image_tools::{CommandImageTools, FormatConverter, MetadataWriter};
use crate::persist::AtomicFileWriter;
use crate::progress::{complete, report, ProgressSink};
use crate::selector::builtin;
use crate::{AssetError, ImageRecord, RawDocument, Stage, StageSummary};

pub const IMAGES_DIR: &str = "images";
pub const MAPPING_FILE: &str = "image_mapping.json";

/// Attributes that may carry an image URL, lazy-load attributes first since
/// `src` then usually holds a placeholder.
pub(crate) const IMAGE_SOURCE_ATTRIBUTES: &[&str] =
    &["data-src", "data-lazy-src", "data-original", "src"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetSettings {
    pub enabled: bool,
    pub max_concurrent: usize,
    /// Per-download timeout.
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_bytes: u64,
    pub auto_convert: bool,
    pub embed_metadata: bool,
    /// Images whose URL or alt text contains one of these are not downloaded.
    pub skip_markers: Vec<String>,
    pub user_agent: String,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: 5,
            timeout_ms: 30_000,
            max_retries: 2,
            retry_delay_ms: 1_000,
            max_bytes: 25 * 1024 * 1024,
            auto_convert: true,
            embed_metadata: true,
            skip_markers: [
                "avatar",
                "gravatar",
                "testimonial",
                "reviewer",
                "review-photo",
                "author-photo",
                "profile-pic",
                "headshot",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// One `<img>` reference, resolved to an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub alt: String,
}

/// Image references of a document in document order, one per distinct URL.
pub fn extract_image_refs(doc: &RawDocument) -> Vec<ImageRef> {
    let Some(selector) = builtin("img") else {
        return Vec::new();
    };
    let base = Url::parse(&doc.url).ok();
    let document = Html::parse_document(&doc.html);
    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    for img in document.select(&selector) {
        let element = img.value();
        let Some(raw) = pick_image_source(|name| element.attr(name)) else {
            continue;
        };
        let Some(url) = resolve_image_url(raw, base.as_ref()) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        refs.push(ImageRef {
            url,
            alt: element.attr("alt").unwrap_or_default().trim().to_string(),
        });
    }
    refs
}

/// First usable source attribute value; inline `data:` URIs never are.
pub(crate) fn pick_image_source<'a>(attr: impl Fn(&str) -> Option<&'a str>) -> Option<&'a str> {
    IMAGE_SOURCE_ATTRIBUTES
        .iter()
        .filter_map(|name| attr(name))
        .map(str::trim)
        .find(|value| !value.is_empty() && !value.to_ascii_lowercase().starts_with("data:"))
}

/// Absolute http(s) URL for an image reference, fragment removed.
pub(crate) fn resolve_image_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let mut url = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

/// Format that needs conversion to JPEG, if any. Either signal is enough;
/// when both name a convertible codec the content type picks which one.
pub fn detect_convertible_format(
    content_type: Option<&str>,
    url_ext: Option<&str>,
) -> Option<&'static str> {
    let declared = content_type.and_then(|ct| match mime_essence(ct).as_str() {
        "image/heic" | "image/heic-sequence" => Some("heic"),
        "image/heif" | "image/heif-sequence" => Some("heif"),
        "image/avif" => Some("avif"),
        _ => None,
    });
    declared.or_else(|| match url_ext?.to_ascii_lowercase().as_str() {
        "heic" => Some("heic"),
        "heif" | "hif" => Some("heif"),
        "avif" => Some("avif"),
        _ => None,
    })
}

fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let ext = match mime_essence(content_type).as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/tiff" => "tif",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "image/heic" | "image/heic-sequence" => "heic",
        "image/heif" | "image/heif-sequence" => "heif",
        "image/avif" => "avif",
        _ => return None,
    };
    Some(ext)
}

fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReport {
    /// Document order, then reference order within each document.
    pub records: Vec<ImageRecord>,
    pub summary: StageSummary,
    pub mapping_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct ImageJob {
    index: usize,
    source_id: String,
    article_slug: String,
    image: ImageRef,
}

impl ImageJob {
    fn record(&self) -> ImageRecord {
        let ext = url_extension(&self.image.url).unwrap_or_else(|| "jpg".to_string());
        ImageRecord {
            original_url: self.image.url.clone(),
            local_filename: local_image_filename(&self.article_slug, &self.image.url, &ext),
            article_slug: self.article_slug.clone(),
            source_id: self.source_id.clone(),
            size_bytes: 0,
            alt_text: self.image.alt.clone(),
            skipped: false,
            format_converted: false,
            original_format: None,
            metadata_embedded: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ToolAvailability {
    converter: bool,
    metadata: bool,
}

/// Downloads the content images of raw documents into `{output_dir}/images`.
pub struct AssetManager {
    settings: AssetSettings,
    client: reqwest::Client,
    output_dir: PathBuf,
    converter: Arc<dyn FormatConverter>,
    metadata: Arc<dyn MetadataWriter>,
    converter_warned: AtomicBool,
}

impl AssetManager {
    pub fn new(settings: AssetSettings, output_dir: &Path) -> Result<Self, AssetError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| AssetError::Client(e.to_string()))?;
        let tools = Arc::new(CommandImageTools::new());
        Ok(Self {
            settings,
            client,
            output_dir: output_dir.to_path_buf(),
            converter: tools.clone(),
            metadata: tools,
            converter_warned: AtomicBool::new(false),
        })
    }

    pub fn with_converter(mut self, converter: Arc<dyn FormatConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_metadata_writer(mut self, metadata: Arc<dyn MetadataWriter>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join(IMAGES_DIR)
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.output_dir.join(MAPPING_FILE)
    }

    fn skip_marker(&self, image: &ImageRef) -> Option<&str> {
        let url = image.url.to_lowercase();
        let alt = image.alt.to_lowercase();
        self.settings
            .skip_markers
            .iter()
            .filter(|marker| !marker.is_empty())
            .find(|marker| {
                let marker = marker.to_lowercase();
                url.contains(&marker) || alt.contains(&marker)
            })
            .map(String::as_str)
    }

    /// Extract, filter and download every image of `docs`, then write the
    /// mapping file. Per-image failures end up in the records.
    pub async fn process(&self, docs: &[RawDocument], sink: &dyn ProgressSink) -> AssetReport {
        let mut summary = StageSummary::new(Stage::Assets);
        if !self.settings.enabled {
            report(sink, Level::Info, Stage::Assets, "asset download disabled");
            complete(sink, summary);
            return AssetReport {
                records: Vec::new(),
                summary,
                mapping_path: None,
            };
        }
        self.converter_warned.store(false, Ordering::Relaxed);

        let mut indexed: Vec<(usize, ImageRecord)> = Vec::new();
        let mut pending: Vec<ImageJob> = Vec::new();
        let mut index = 0;
        for doc in docs {
            let slug = article_slug(&doc.source_id);
            for image in extract_image_refs(doc) {
                let job = ImageJob {
                    index,
                    source_id: doc.source_id.clone(),
                    article_slug: slug.clone(),
                    image,
                };
                index += 1;
                if let Some(marker) = self.skip_marker(&job.image) {
                    report(
                        sink,
                        Level::Debug,
                        Stage::Assets,
                        format!("skipping {} (matches '{marker}')", job.image.url),
                    );
                    let mut record = job.record();
                    record.skipped = true;
                    indexed.push((job.index, record));
                } else {
                    pending.push(job);
                }
            }
        }
        report(
            sink,
            Level::Info,
            Stage::Assets,
            format!(
                "{} image references, {} to download",
                index,
                pending.len()
            ),
        );

        let tools = self.probe_tools().await;
        let downloaded: Vec<(usize, ImageRecord)> = stream::iter(pending)
            .map(|job| self.download(job, tools, sink))
            .buffer_unordered(self.settings.max_concurrent.max(1))
            .collect()
            .await;
        indexed.extend(downloaded);
        indexed.sort_by_key(|(index, _)| *index);
        let records: Vec<ImageRecord> = indexed.into_iter().map(|(_, record)| record).collect();

        for record in &records {
            if record.skipped {
                summary.skipped += 1;
            } else if record.error.is_some() {
                summary.failed += 1;
            } else {
                summary.succeeded += 1;
            }
        }

        let mapping_path = match self.write_mapping(&records) {
            Ok(path) => Some(path),
            Err(err) => {
                report(
                    sink,
                    Level::Error,
                    Stage::Assets,
                    format!("could not write {MAPPING_FILE}: {err}"),
                );
                None
            }
        };

        complete(sink, summary);
        AssetReport {
            records,
            summary,
            mapping_path,
        }
    }

    pub fn write_mapping(&self, records: &[ImageRecord]) -> Result<PathBuf, AssetError> {
        let json = serde_json::to_string_pretty(records).map_err(|e| AssetError::Io(e.to_string()))?;
        AtomicFileWriter::new(self.output_dir.clone())
            .write(MAPPING_FILE, &json)
            .map_err(|e| AssetError::Io(e.to_string()))
    }

    async fn probe_tools(&self) -> ToolAvailability {
        let converter = self.converter.clone();
        let metadata = self.metadata.clone();
        let probe_converter = self.settings.auto_convert;
        let probe_metadata = self.settings.embed_metadata;
        tokio::task::spawn_blocking(move || ToolAvailability {
            converter: probe_converter && converter.available(),
            metadata: probe_metadata && metadata.available(),
        })
        .await
        .unwrap_or_default()
    }

    fn warn_converter_missing(&self, sink: &dyn ProgressSink, format: &str) {
        if !self.converter_warned.swap(true, Ordering::Relaxed) {
            report(
                sink,
                Level::Warn,
                Stage::Assets,
                format!("no image converter available; keeping {format} images unconverted"),
            );
        }
    }

    async fn download(
        &self,
        job: ImageJob,
        tools: ToolAvailability,
        sink: &dyn ProgressSink,
    ) -> (usize, ImageRecord) {
        let mut record = job.record();
        let (body, content_type) = match self.download_bytes(&job.image.url).await {
            Ok(result) => result,
            Err(err) => {
                report(sink, Level::Warn, Stage::Assets, err.to_string());
                record.error = Some(err.to_string());
                return (job.index, record);
            }
        };

        let url_ext = url_extension(&job.image.url);
        let convertible = detect_convertible_format(content_type.as_deref(), url_ext.as_deref());
        let ext = convertible
            .map(str::to_string)
            .or_else(|| {
                content_type
                    .as_deref()
                    .and_then(extension_for_content_type)
                    .map(str::to_string)
            })
            .or(url_ext)
            .unwrap_or_else(|| "jpg".to_string());

        let convert_from = match convertible {
            Some(format) if self.settings.auto_convert => {
                if tools.converter {
                    Some(format)
                } else {
                    self.warn_converter_missing(sink, format);
                    None
                }
            }
            _ => None,
        };
        let description = (self.settings.embed_metadata
            && tools.metadata
            && !job.image.alt.is_empty())
        .then(|| job.image.alt.clone());

        let task = StoreTask {
            images_dir: self.images_dir(),
            article_slug: job.article_slug.clone(),
            url: job.image.url.clone(),
            ext,
            body,
            convert_from,
            description,
            converter: self.converter.clone(),
            metadata: self.metadata.clone(),
        };
        match tokio::task::spawn_blocking(move || task.run()).await {
            Ok(Ok(stored)) => {
                for warning in &stored.warnings {
                    report(sink, Level::Warn, Stage::Assets, warning.clone());
                }
                report(
                    sink,
                    Level::Debug,
                    Stage::Assets,
                    format!("{} -> {}", job.image.url, stored.local_filename),
                );
                record.local_filename = stored.local_filename;
                record.size_bytes = stored.size_bytes;
                record.format_converted = stored.original_format.is_some();
                record.original_format = stored.original_format;
                record.metadata_embedded = stored.metadata_embedded;
            }
            Ok(Err(err)) => {
                report(sink, Level::Warn, Stage::Assets, err.to_string());
                record.error = Some(err.to_string());
            }
            Err(err) => {
                report(sink, Level::Error, Stage::Assets, err.to_string());
                record.error = Some(err.to_string());
            }
        }
        (job.index, record)
    }

    async fn download_bytes(&self, url: &str) -> Result<(Bytes, Option<String>), AssetError> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_download(url).await {
                Ok(result) => return Ok(result),
                Err(_) if attempt < self.settings.max_retries => {
                    attempt += 1;
                    let delay = self.settings.retry_delay_ms.saturating_mul(u64::from(attempt));
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_download(&self, url: &str) -> Result<(Bytes, Option<String>), AssetError> {
        let failed = |message: String| AssetError::DownloadFailed {
            url: url.to_string(),
            message,
        };
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_millis(self.settings.timeout_ms))
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("http status {status}")));
        }
        if let Some(len) = response.content_length() {
            if len > self.settings.max_bytes {
                return Err(failed(format!("image too large ({len} bytes)")));
            }
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let mut body = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| failed(e.to_string()))?;
            if body.len() as u64 + chunk.len() as u64 > self.settings.max_bytes {
                return Err(failed(format!(
                    "image too large (max {} bytes)",
                    self.settings.max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok((Bytes::from(body), content_type))
    }
}

/// Blocking tail of one download: write, convert, tag.
struct StoreTask {
    images_dir: PathBuf,
    article_slug: String,
    url: String,
    ext: String,
    body: Bytes,
    convert_from: Option<&'static str>,
    description: Option<String>,
    converter: Arc<dyn FormatConverter>,
    metadata: Arc<dyn MetadataWriter>,
}

struct Stored {
    local_filename: String,
    size_bytes: u64,
    original_format: Option<String>,
    metadata_embedded: bool,
    warnings: Vec<String>,
}

impl StoreTask {
    fn run(self) -> Result<Stored, AssetError> {
        let writer = AtomicFileWriter::new(self.images_dir.clone());
        let filename = local_image_filename(&self.article_slug, &self.url, &self.ext);
        let mut path = writer
            .write_bytes(&filename, &self.body)
            .map_err(|e| AssetError::Io(e.to_string()))?;
        let mut stored = Stored {
            local_filename: filename,
            size_bytes: self.body.len() as u64,
            original_format: None,
            metadata_embedded: false,
            warnings: Vec::new(),
        };

        if let Some(format) = self.convert_from {
            let jpeg_name = local_image_filename(&self.article_slug, &self.url, "jpg");
            let jpeg_path = writer.dir().join(&jpeg_name);
            match self.converter.convert_to_jpeg(&path, &jpeg_path) {
                Ok(()) => {
                    if let Err(err) = fs::remove_file(&path) {
                        stored
                            .warnings
                            .push(format!("could not remove {}: {err}", path.display()));
                    }
                    path = jpeg_path;
                    stored.local_filename = jpeg_name;
                    stored.original_format = Some(format.to_string());
                    stored.size_bytes = fs::metadata(&path)?.len();
                }
                Err(err) => stored.warnings.push(err.to_string()),
            }
        }

        if let Some(description) = self.description.as_deref() {
            match self.metadata.embed_description(&path, description) {
                Ok(()) => {
                    stored.metadata_embedded = true;
                    stored.size_bytes = fs::metadata(&path)?.len();
                }
                Err(err) => stored.warnings.push(err.to_string()),
            }
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> RawDocument {
        RawDocument {
            source_id: "example.com_blog_post.html".to_string(),
            url: "https://example.com/blog/post.html".to_string(),
            html: html.to_string(),
            fetched_at: String::new(),
        }
    }

    #[test]
    fn references_are_resolved_and_deduplicated() {
        let refs = extract_image_refs(&doc(
            r#"<img src="a.jpg" alt=" A "><img src="/a.jpg"><img src="https://example.com/blog/a.jpg#x">
               <img src="data:image/gif;base64,R0lG" data-src="lazy.png"><img src="data:image/png;base64,AA">"#,
        ));
        assert_eq!(
            refs,
            vec![
                ImageRef {
                    url: "https://example.com/blog/a.jpg".into(),
                    alt: "A".into()
                },
                ImageRef {
                    url: "https://example.com/a.jpg".into(),
                    alt: String::new()
                },
                ImageRef {
                    url: "https://example.com/blog/lazy.png".into(),
                    alt: String::new()
                },
            ]
        );
    }

    #[test]
    fn either_signal_marks_an_image_convertible() {
        assert_eq!(detect_convertible_format(Some("image/heic"), Some("png")), Some("heic"));
        assert_eq!(detect_convertible_format(Some("image/png"), Some("heic")), Some("heic"));
        assert_eq!(detect_convertible_format(Some("image/avif"), Some("heic")), Some("avif"));
        assert_eq!(
            detect_convertible_format(Some("application/octet-stream"), Some("avif")),
            Some("avif")
        );
        assert_eq!(detect_convertible_format(None, Some("HEIF")), Some("heif"));
        assert_eq!(detect_convertible_format(Some("image/png"), Some("png")), None);
        assert_eq!(detect_convertible_format(None, None), None);
    }
}
