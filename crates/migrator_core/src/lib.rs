//! Migrator core: pure domain types and identifier derivation, no IO.
mod content;
mod slug;
mod source_id;
mod url_list;

pub use content::{ClassificationVerdict, ContentType, UnknownContentType, UrlEntry};
pub use slug::{
    article_slug, export_slug, fallback_title, image_identifier, local_image_filename,
    normalize_extension, short_hash, slugify, url_extension, MAX_ARTICLE_SLUG_LEN,
};
pub use source_id::{source_id_for_url, split_source_id, PAGE_EXTENSIONS};
pub use url_list::{normalize_url_for_dedupe, parse_url_list, UrlListParse};
