use sha2::{Digest, Sha256};
use url::Url;

use crate::source_id::{
    is_index_segment, percent_decode, split_source_id, strip_page_extension, PAGE_EXTENSIONS,
};

pub const MAX_ARTICLE_SLUG_LEN: usize = 50;
const MIN_ARTICLE_SLUG_LEN: usize = 3;
const BLOG_SECTION_TOKEN: &str = "blog";

const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec",
];

/// Short identifier used to namespace an article's images.
///
/// Drops the host, date-like tokens (years, month names, day numbers), the
/// `blog` section token and extension remnants. Falls back to a hash-derived
/// placeholder when fewer than three characters survive.
pub fn article_slug(source_id: &str) -> String {
    let (_host, segments) = split_source_id(source_id);

    let tokens: Vec<String> = segments
        .iter()
        .flat_map(|segment| segment.split(|c: char| c == '-' || c == '.' || c == ' '))
        .map(|token| token.to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .filter(|token| !is_date_like(token))
        .filter(|token| token != BLOG_SECTION_TOKEN)
        .filter(|token| !PAGE_EXTENSIONS.contains(&token.as_str()))
        .collect();

    let mut slug = collapse_hyphens(&tokens.join("-"));
    truncate_on_char_boundary(&mut slug, MAX_ARTICLE_SLUG_LEN);
    let slug = slug.trim_matches('-').to_string();

    if slug.len() < MIN_ARTICLE_SLUG_LEN {
        format!("article-{}", short_hash(source_id, 3))
    } else {
        slug
    }
}

/// Import slug: the last usable (non-index) path segment of the source id. The title is
/// used only when the path yields nothing (root or index pages).
pub fn export_slug(source_id: &str, title: &str) -> String {
    let (_host, segments) = split_source_id(source_id);
    let from_path = segments
        .iter()
        .rev()
        .filter(|segment| !is_index_segment(segment))
        .map(|segment| slugify(strip_page_extension(segment)))
        .find(|slug| !slug.is_empty());

    if let Some(slug) = from_path {
        return slug;
    }
    let from_title = slugify(title);
    if from_title.is_empty() {
        format!("page-{}", short_hash(source_id, 3))
    } else {
        from_title
    }
}

/// Human-readable title recovered from a source id, used when a document has
/// no title markup.
pub fn fallback_title(source_id: &str) -> String {
    let (host, segments) = split_source_id(source_id);
    let base = segments
        .iter()
        .rev()
        .find(|segment| !is_index_segment(segment))
        .copied()
        .unwrap_or(host);

    base.split(|c: char| c == '-' || c == '.' || c == '_')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case ASCII slug with single hyphens between words.
pub fn slugify(input: &str) -> String {
    let mapped: String = input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    collapse_hyphens(&mapped).trim_matches('-').to_string()
}

/// Identifier for an image carved from its URL: the sanitized file stem of the
/// last path segment, or a hash of the URL when the path has no usable name.
pub fn image_identifier(original_url: &str) -> String {
    let stem = Url::parse(original_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .map(|last| percent_decode(&last))
        .map(|last| match last.rsplit_once('.') {
            Some((stem, _ext)) => stem.to_string(),
            None => last,
        })
        .map(|stem| slugify(&stem))
        .unwrap_or_default();

    if stem.is_empty() {
        short_hash(original_url, 4)
    } else {
        stem
    }
}

/// Lower-cased extension of the URL's last path segment, `jpeg` folded to `jpg`.
pub fn url_extension(original_url: &str) -> Option<String> {
    let url = Url::parse(original_url).ok()?;
    let last = url.path_segments()?.next_back()?.to_string();
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(normalize_extension(&ext))
}

pub fn normalize_extension(ext: &str) -> String {
    match ext.to_ascii_lowercase().as_str() {
        "jpeg" | "jpe" => "jpg".to_string(),
        "tiff" => "tif".to_string(),
        other => other.to_string(),
    }
}

/// `{article_slug}_{image_identifier}.{ext}`
pub fn local_image_filename(article_slug: &str, original_url: &str, ext: &str) -> String {
    format!("{article_slug}_{}.{ext}", image_identifier(original_url))
}

/// First `bytes` bytes of the SHA-256 digest, hex encoded.
pub fn short_hash(input: &str, bytes: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(bytes * 2);
    for byte in digest.iter().take(bytes) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

fn is_date_like(token: &str) -> bool {
    let all_digits = token.chars().all(|c| c.is_ascii_digit());
    if all_digits && (token.len() == 4 || token.len() <= 2) {
        return true;
    }
    MONTHS.contains(&token)
}

fn collapse_hyphens(input: &str) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev_hyphen = false;
    for c in input.chars() {
        if c == '-' {
            if !prev_hyphen {
                compacted.push(c);
            }
            prev_hyphen = true;
        } else {
            compacted.push(c);
            prev_hyphen = false;
        }
    }
    compacted
}

fn truncate_on_char_boundary(value: &mut String, max: usize) {
    if value.len() <= max {
        return;
    }
    let mut end = max;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value.truncate(end);
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
