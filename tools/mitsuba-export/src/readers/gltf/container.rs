//! GLB container validation
//!
//! # Layout
//! ```text
//! 0x00: magic "glTF"
//! 0x04: version u32 (2)
//! 0x08: length u32 (whole file)
//! 0x0C: chunk 0 length u32, type u32 ("JSON"), data (padded with spaces)
//! ....: chunk 1 length u32, type u32 ("BIN\0"), data (padded with zeros), optional
//! ```
//!
//! Chunk lengths must be multiples of 4 and every chunk must fit inside the
//! declared file length. Failures report the byte offset of the bad field.

use std::ops::Range;
use std::path::Path;

use crate::error::ParseError;

pub const GLB_MAGIC: &[u8; 4] = b"glTF";
pub const GLB_VERSION: u32 = 2;
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
pub const CHUNK_BIN: u32 = 0x004E_4942;

const HEADER_SIZE: usize = 12;
const CHUNK_HEADER_SIZE: usize = 8;

/// Byte ranges of the chunks of a validated GLB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlbLayout {
    pub json: Range<usize>,
    pub bin: Option<Range<usize>>,
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Validate the GLB container structure of `bytes`
pub fn validate_glb(path: &Path, bytes: &[u8]) -> Result<GlbLayout, ParseError> {
    let err = |offset: usize, reason: String| ParseError::new(path, reason).at_offset(offset as u64);

    if bytes.len() < HEADER_SIZE {
        return Err(err(
            bytes.len(),
            format!("GLB header truncated: {} of {} bytes", bytes.len(), HEADER_SIZE),
        ));
    }
    if &bytes[0..4] != GLB_MAGIC {
        return Err(err(0, "not a GLB file (bad magic)".to_string()));
    }
    let version = read_u32(bytes, 4).unwrap_or(0);
    if version != GLB_VERSION {
        return Err(err(4, format!("unsupported GLB version {}", version)));
    }

    let declared = read_u32(bytes, 8).unwrap_or(0) as usize;
    if declared > bytes.len() {
        return Err(err(
            bytes.len(),
            format!(
                "file truncated: header declares {} bytes, found {}",
                declared,
                bytes.len()
            ),
        ));
    }
    if declared < HEADER_SIZE + CHUNK_HEADER_SIZE {
        return Err(err(8, format!("declared length {} too small", declared)));
    }

    let mut json = None;
    let mut bin = None;
    let mut offset = HEADER_SIZE;
    let mut index = 0usize;

    while offset < declared {
        if offset + CHUNK_HEADER_SIZE > declared {
            return Err(err(offset, format!("chunk {} header truncated", index)));
        }
        let length = read_u32(bytes, offset).unwrap_or(0) as usize;
        let kind = read_u32(bytes, offset + 4).unwrap_or(0);
        let start = offset + CHUNK_HEADER_SIZE;
        let end = start
            .checked_add(length)
            .ok_or_else(|| err(offset, format!("chunk {} length overflows", index)))?;

        if length % 4 != 0 {
            return Err(err(
                offset,
                format!("chunk {} length {} is not 4-byte aligned", index, length),
            ));
        }
        if end > declared {
            return Err(err(
                offset,
                format!(
                    "chunk {} overruns file: ends at {}, file length {}",
                    index, end, declared
                ),
            ));
        }

        match (index, kind) {
            (0, CHUNK_JSON) => json = Some(start..end),
            (0, _) => return Err(err(offset + 4, "first chunk is not JSON".to_string())),
            (_, CHUNK_JSON) => {
                return Err(err(offset + 4, "more than one JSON chunk".to_string()))
            }
            (_, CHUNK_BIN) if bin.is_some() => {
                return Err(err(offset + 4, "more than one BIN chunk".to_string()))
            }
            (_, CHUNK_BIN) => bin = Some(start..end),
            // Unknown chunk types are skipped.
            _ => {}
        }

        offset = end;
        index += 1;
    }

    let json = json.ok_or_else(|| err(HEADER_SIZE, "missing JSON chunk".to_string()))?;
    Ok(GlbLayout { json, bin })
}
