use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::RawDocument;

const RAW_HEADER_PREFIX: &str = "<!-- migrator-source";
const RAW_HEADER_SUFFIX: &str = "-->";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("stored document {0} has no source header")]
    MissingHeader(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Basic writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        self.write_bytes(filename, content.as_bytes())
    }

    pub fn write_bytes(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        // Replace existing file if present to keep determinism.
        if target.exists() {
            fs::remove_file(&target)?;
        }
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// One file per document, keyed by source id.
#[derive(Debug, Clone)]
pub struct ContentStore {
    writer: AtomicFileWriter,
}

impl ContentStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
        }
    }

    pub fn path_for(&self, source_id: &str) -> PathBuf {
        self.writer.dir().join(source_id)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.path_for(source_id).is_file()
    }

    pub fn write(&self, source_id: &str, html: &str) -> Result<PathBuf, PersistError> {
        self.writer.write(source_id, html)
    }

    pub fn read(&self, source_id: &str) -> Result<String, PersistError> {
        Ok(fs::read_to_string(self.path_for(source_id))?)
    }

    /// Raw documents carry their URL and fetch time in a leading comment so a
    /// later run can resume from the store.
    pub fn write_raw(&self, doc: &RawDocument) -> Result<PathBuf, PersistError> {
        self.write(&doc.source_id, &encode_raw_document(doc))
    }

    pub fn read_raw(&self, source_id: &str) -> Result<RawDocument, PersistError> {
        let content = self.read(source_id)?;
        decode_raw_document(source_id, &content)
    }
}

pub fn encode_raw_document(doc: &RawDocument) -> String {
    format!(
        "{RAW_HEADER_PREFIX}\nurl: {url}\nfetched_at: {fetched_at}\n{RAW_HEADER_SUFFIX}\n{html}",
        url = doc.url,
        fetched_at = doc.fetched_at,
        html = doc.html,
    )
}

pub fn decode_raw_document(source_id: &str, content: &str) -> Result<RawDocument, PersistError> {
    let missing = || PersistError::MissingHeader(source_id.to_string());
    let rest = content.strip_prefix(RAW_HEADER_PREFIX).ok_or_else(missing)?;
    let end = rest.find(RAW_HEADER_SUFFIX).ok_or_else(missing)?;
    let header = &rest[..end];
    let mut html = &rest[end + RAW_HEADER_SUFFIX.len()..];
    if let Some(stripped) = html.strip_prefix('\n') {
        html = stripped;
    }

    let mut url = String::new();
    let mut fetched_at = String::new();
    for line in header.lines() {
        if let Some((k, v)) = line.split_once(':') {
            match k.trim() {
                "url" => url = v.trim().to_string(),
                "fetched_at" => fetched_at = v.trim().to_string(),
                _ => {}
            }
        }
    }
    if url.is_empty() {
        return Err(missing());
    }

    Ok(RawDocument {
        source_id: source_id.to_string(),
        url,
        html: html.to_string(),
        fetched_at,
    })
}
