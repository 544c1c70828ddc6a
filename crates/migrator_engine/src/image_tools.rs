//! Optional external image tools.
//!
//! Conversion and metadata embedding are capabilities: callers ask
//! `available()` first and carry on without them when a tool is missing.

use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use engine_logging::engine_debug;

use crate::AssetError;

pub trait FormatConverter: Send + Sync {
    fn available(&self) -> bool;

    /// Write a JPEG rendition of `source` to `target`. `source` is left alone.
    fn convert_to_jpeg(&self, source: &Path, target: &Path) -> Result<(), AssetError>;
}

pub trait MetadataWriter: Send + Sync {
    fn available(&self) -> bool;

    /// Embed `description` as the image's caption/description tags.
    fn embed_description(&self, path: &Path, description: &str) -> Result<(), AssetError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConverterProgram {
    Magick,
    HeifConvert,
}

/// Shells out to ImageMagick (or libheif's `heif-convert`) and `exiftool`.
/// Each probe runs at most once per value.
#[derive(Debug, Default)]
pub struct CommandImageTools {
    converter: OnceLock<Option<ConverterProgram>>,
    exiftool: OnceLock<bool>,
}

impl CommandImageTools {
    pub fn new() -> Self {
        Self::default()
    }

    fn converter_program(&self) -> Option<ConverterProgram> {
        *self.converter.get_or_init(|| {
            let program = if probe("magick", &["-version"]) {
                Some(ConverterProgram::Magick)
            } else if probe("heif-convert", &["--version"]) {
                Some(ConverterProgram::HeifConvert)
            } else {
                None
            };
            engine_debug!("image converter probe: {:?}", program);
            program
        })
    }
}

impl FormatConverter for CommandImageTools {
    fn available(&self) -> bool {
        self.converter_program().is_some()
    }

    fn convert_to_jpeg(&self, source: &Path, target: &Path) -> Result<(), AssetError> {
        let conversion_failed = |message: String| AssetError::ConversionFailed {
            path: source.display().to_string(),
            message,
        };
        let mut cmd = match self.converter_program() {
            Some(ConverterProgram::Magick) => {
                let mut cmd = Command::new("magick");
                // First frame only; HEIC files may hold image sequences.
                cmd.arg(format!("{}[0]", source.display()))
                    .args(["-auto-orient", "-quality", "90"])
                    .arg(target);
                cmd
            }
            Some(ConverterProgram::HeifConvert) => {
                let mut cmd = Command::new("heif-convert");
                cmd.args(["-q", "90"]).arg(source).arg(target);
                cmd
            }
            None => return Err(conversion_failed("no converter available".to_string())),
        };
        run(&mut cmd).map_err(conversion_failed)
    }
}

impl MetadataWriter for CommandImageTools {
    fn available(&self) -> bool {
        *self.exiftool.get_or_init(|| {
            let found = probe("exiftool", &["-ver"]);
            engine_debug!("exiftool probe: {found}");
            found
        })
    }

    fn embed_description(&self, path: &Path, description: &str) -> Result<(), AssetError> {
        let mut cmd = Command::new("exiftool");
        cmd.args(["-overwrite_original", "-q"])
            .arg(format!("-ImageDescription={description}"))
            .arg(format!("-XMP-dc:Description={description}"))
            .arg(format!("-IPTC:Caption-Abstract={description}"))
            .arg(path);
        run(&mut cmd).map_err(|message| AssetError::MetadataFailed {
            path: path.display().to_string(),
            message,
        })
    }
}

/// Reports every capability as unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopImageTools;

impl FormatConverter for NoopImageTools {
    fn available(&self) -> bool {
        false
    }

    fn convert_to_jpeg(&self, source: &Path, _target: &Path) -> Result<(), AssetError> {
        Err(AssetError::ConversionFailed {
            path: source.display().to_string(),
            message: "conversion disabled".to_string(),
        })
    }
}

impl MetadataWriter for NoopImageTools {
    fn available(&self) -> bool {
        false
    }

    fn embed_description(&self, path: &Path, _description: &str) -> Result<(), AssetError> {
        Err(AssetError::MetadataFailed {
            path: path.display().to_string(),
            message: "metadata embedding disabled".to_string(),
        })
    }
}

fn probe(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn run(cmd: &mut Command) -> Result<(), String> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let output = cmd
        .output()
        .map_err(|e| format!("failed to execute {program}: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        ));
    }
    Ok(())
}
