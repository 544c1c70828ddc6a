//! Migration engine: fetch, sanitize/classify, asset and export stages plus
//! the on-disk stores they share.
mod assets;
mod classify;
mod dates;
mod decode;
mod dom;
mod error;
mod export;
mod fetch;
mod image_tools;
mod lists;
mod persist;
mod pipeline;
mod progress;
mod sanitize;
mod selector;
mod style;
mod types;

pub use assets::{
    detect_convertible_format, extract_image_refs, AssetManager, AssetReport, AssetSettings,
    ImageRef, IMAGES_DIR, MAPPING_FILE,
};
pub use classify::{ClassificationConfig, Classifier};
pub use dates::{extract_published_date, parse_date, DATE_FORMAT};
pub use decode::{decode_html, DecodedHtml};
pub use error::{AssetError, FetchError, FetchFailureKind, TransformError};
pub use export::{
    csv_field, extract_excerpt, extract_title, serialize_rows, ExportError, ExportOptions,
    ExportSummary, Exporter, CSV_HEADER,
};
pub use fetch::{
    fetch_all, fetch_with_retry, find_challenge_marker, FetchFailure, FetchReport, FetchSettings,
    FetchedPage, Fetcher, ReqwestFetcher,
};
pub use image_tools::{CommandImageTools, FormatConverter, MetadataWriter, NoopImageTools};
pub use persist::{
    decode_raw_document, encode_raw_document, ensure_output_dir, AtomicFileWriter, ContentStore,
    PersistError,
};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineError, PipelineReport, CLASSIFICATION_REPORT, CLEAN_DIR,
    RAW_DIR,
};
pub use progress::{LogSink, ProgressSink};
pub use sanitize::{SanitizeFailure, SanitizeOptions, SanitizeReport, Sanitizer};
pub use selector::{compile, compile_all, matches, normalize_selector};
pub use types::{
    CleanDocument, ExportRow, ImageRecord, PipelineEvent, RawDocument, Stage, StageSummary,
};
