use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target content type in the import platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Page,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Page => "page",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownContentType(pub String);

impl fmt::Display for UnknownContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown content type '{}'", self.0)
    }
}

impl std::error::Error for UnknownContentType {}

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" => Ok(ContentType::Post),
            "page" => Ok(ContentType::Page),
            other => Err(UnknownContentType(other.to_string())),
        }
    }
}

/// One line of the input URL list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntry {
    pub url: String,
    pub type_hint: Option<ContentType>,
}

impl UrlEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            type_hint: None,
        }
    }

    pub fn with_hint(url: impl Into<String>, hint: ContentType) -> Self {
        Self {
            url: url.into(),
            type_hint: Some(hint),
        }
    }
}

/// Post-vs-page decision for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationVerdict {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// 0..=100
    pub confidence: u8,
    pub reason: String,
}

impl ClassificationVerdict {
    pub fn new(content_type: ContentType, confidence: u8, reason: impl Into<String>) -> Self {
        Self {
            content_type,
            confidence: confidence.min(100),
            reason: reason.into(),
        }
    }
}
