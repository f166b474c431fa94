//! Source format readers
//!
//! Each reader turns one asset file into a complete [`Scene`] or fails.
//! Readers validate the container before building geometry, keep the
//! source hierarchy, and attach raw material parameter bags. BSDF mapping
//! happens later.

pub mod gltf;
pub mod obj;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::context::ConversionContext;
use crate::diagnostics::WarningSink;
use crate::error::{ConversionError, ParseError};
use crate::scene::Scene;

/// Supported input container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Gltf,
    Obj,
}

/// A reader for one source format
pub trait FormatReader: Sync {
    fn read(
        &self,
        path: &Path,
        ctx: &ConversionContext,
        warnings: &WarningSink,
    ) -> Result<Scene, ConversionError>;
}

/// Pick the input format: GLB magic first, then extension, then a JSON sniff.
pub fn detect(path: &Path) -> Result<InputFormat, ConversionError> {
    let mut head = [0u8; 16];
    let read = File::open(path)
        .and_then(|mut f| f.read(&mut head))
        .map_err(|e| ConversionError::io(path, e))?;
    let head = &head[..read];

    if head.starts_with(b"glTF") {
        return Ok(InputFormat::Gltf);
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "gltf" | "glb" => return Ok(InputFormat::Gltf),
        "obj" => return Ok(InputFormat::Obj),
        _ => {}
    }

    if head.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
        return Ok(InputFormat::Gltf);
    }
    Err(ConversionError::UnsupportedFormat(path.to_path_buf()))
}

pub fn reader_for(format: InputFormat) -> &'static dyn FormatReader {
    match format {
        InputFormat::Gltf => &gltf::GltfReader,
        InputFormat::Obj => &obj::ObjReader,
    }
}

/// Detect the format of `path` and read it
pub fn read(
    path: &Path,
    ctx: &ConversionContext,
    warnings: &WarningSink,
) -> Result<Scene, ConversionError> {
    let format = detect(path)?;
    tracing::info!("Reading {:?} as {:?}", path, format);
    reader_for(format).read(path, ctx, warnings)
}

/// Read a whole source file
pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>, ConversionError> {
    std::fs::read(path).map_err(|e| ConversionError::io(path, e))
}

/// Resolve a file referenced by an asset, relative to the asset's directory.
///
/// A missing file is a parse error of the referencing asset.
pub(crate) fn resolve_reference(
    asset: &Path,
    reference: &str,
) -> Result<PathBuf, ParseError> {
    let base = asset.parent().unwrap_or_else(|| Path::new(""));
    let decoded = percent_decode(reference);
    let candidate = base.join(decoded.replace('\\', "/"));
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(ParseError::new(
            asset,
            format!("missing referenced file '{}'", reference),
        ))
    }
}

/// Decode `%XX` escapes in a URI path; malformed escapes are kept verbatim
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(v) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// File stem of a path, or `fallback`
pub(crate) fn stem_or(path: &Path, fallback: &str) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
