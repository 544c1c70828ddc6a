use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FetchFailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FetchFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailureKind {
    Timeout,
    /// Anti-bot defenses answered instead of the page.
    Blocked,
    NavigationFailed,
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailureKind::Timeout => write!(f, "timeout"),
            FetchFailureKind::Blocked => write!(f, "blocked"),
            FetchFailureKind::NavigationFailed => write!(f, "navigation failed"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("failed to parse document {source_id}: {message}")]
    ParseFailure { source_id: String, message: String },
    #[error("invalid selector '{selector}': {message}")]
    SelectorError { selector: String, message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("download of {url} failed: {message}")]
    DownloadFailed { url: String, message: String },
    #[error("conversion of {path} failed: {message}")]
    ConversionFailed { path: String, message: String },
    #[error("metadata embedding for {path} failed: {message}")]
    MetadataFailed { path: String, message: String },
    #[error("http client setup failed: {0}")]
    Client(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AssetError {
    fn from(err: std::io::Error) -> Self {
        AssetError::Io(err.to_string())
    }
}
