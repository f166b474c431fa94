//! Error types for the conversion pipeline

use std::fmt;
use std::path::{Path, PathBuf};

use mitsuba_common::FormatError;

/// Where in the source a parse failure was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Unknown,
    /// Byte offset into a binary container
    Offset(u64),
    /// 1-based line number in a text format
    Line(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Unknown => Ok(()),
            Location::Offset(offset) => write!(f, " (at byte offset {})", offset),
            Location::Line(line) => write!(f, " (line {})", line),
        }
    }
}

/// Malformed or structurally unsupported input. Always fatal for the asset.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {}{}", .path.display(), .reason, .location)]
pub struct ParseError {
    pub path: PathBuf,
    pub reason: String,
    pub location: Location,
}

impl ParseError {
    pub fn new(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
            location: Location::Unknown,
        }
    }

    pub fn at_offset(mut self, offset: u64) -> Self {
        self.location = Location::Offset(offset);
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.location = Location::Line(line);
        self
    }
}

/// Terminal failure of one `convert` invocation
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unsupported input format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("mesh '{mesh}' could not be encoded: {source}")]
    MeshEncoding { mesh: String, source: FormatError },

    #[error("texture '{texture}' could not be converted: {source}")]
    Texture {
        texture: String,
        source: image::ImageError,
    },
}

impl ConversionError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_with_line() {
        let err = ParseError::new("model.obj", "dangling vertex index 9").at_line(12);
        assert_eq!(err.to_string(), "model.obj: dangling vertex index 9 (line 12)");
    }

    #[test]
    fn test_parse_error_display_with_offset() {
        let err = ParseError::new("scene.glb", "chunk overruns file").at_offset(1024);
        assert_eq!(err.to_string(), "scene.glb: chunk overruns file (at byte offset 1024)");
    }

    #[test]
    fn test_conversion_error_wraps_parse() {
        let err: ConversionError = ParseError::new("a.gltf", "bad").into();
        assert!(err.is_parse());
    }
}
