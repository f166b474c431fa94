//! Mitsuba serialized mesh format (.serialized, version 4)
//!
//! # Layout
//! ```text
//! 0x00: magic u16 (0x041C)
//! 0x02: version u16 (4)
//! 0x04: zlib stream
//!         flags u32
//!         name (UTF-8, NUL-terminated)
//!         vertex_count u64
//!         triangle_count u64
//!         positions   (vertex_count * 3 * f32)
//!         normals     (vertex_count * 3 * f32), if FLAG_NORMALS
//!         texcoords   (vertex_count * 2 * f32), if FLAG_TEXCOORDS
//!         colors      (vertex_count * 3 * f32), if FLAG_COLORS
//!         indices     (triangle_count * 3 * u32)
//! end-12: mesh offset u64 (always 0, one mesh per file)
//! end-4:  mesh count u32 (always 1)
//! ```

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::{ByteReader, FormatError, MeshBuffers, MeshView};

pub const SERIALIZED_MAGIC: u16 = 0x041C;
pub const SERIALIZED_VERSION: u16 = 4;

pub const FLAG_NORMALS: u32 = 0x0001;
pub const FLAG_TEXCOORDS: u32 = 0x0002;
pub const FLAG_COLORS: u32 = 0x0008;
pub const FLAG_FACE_NORMALS: u32 = 0x0010;
pub const FLAG_SINGLE_PRECISION: u32 = 0x1000;
pub const FLAG_DOUBLE_PRECISION: u32 = 0x2000;

/// Fixed zlib level, so the output only depends on the mesh content
const COMPRESSION_LEVEL: u32 = 6;

/// Size of the trailing offset dictionary
const TRAILER_SIZE: usize = 12;

/// Decoded header of the compressed body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedHeader {
    pub flags: u32,
    pub name: String,
    pub vertex_count: u64,
    pub triangle_count: u64,
}

impl SerializedHeader {
    pub fn for_mesh(mesh: &MeshView<'_>) -> Self {
        let mut flags = FLAG_SINGLE_PRECISION;
        if mesh.normals.is_some() {
            flags |= FLAG_NORMALS;
        } else {
            flags |= FLAG_FACE_NORMALS;
        }
        if mesh.uvs.is_some() {
            flags |= FLAG_TEXCOORDS;
        }
        if mesh.colors.is_some() {
            flags |= FLAG_COLORS;
        }
        Self {
            flags,
            name: mesh.name.to_string(),
            vertex_count: mesh.positions.len() as u64,
            triangle_count: mesh.indices.len() as u64,
        }
    }

    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// Encode a mesh into a complete `.serialized` file image.
pub fn encode(mesh: &MeshView<'_>) -> Result<Vec<u8>, FormatError> {
    mesh.validate()?;
    if mesh.name.contains('\0') {
        return Err(FormatError::InvalidHeader(format!(
            "mesh name {:?} contains a NUL byte",
            mesh.name
        )));
    }

    let header = SerializedHeader::for_mesh(mesh);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));

    encoder.write_all(&header.flags.to_le_bytes())?;
    encoder.write_all(header.name.as_bytes())?;
    encoder.write_all(&[0])?;
    encoder.write_all(&header.vertex_count.to_le_bytes())?;
    encoder.write_all(&header.triangle_count.to_le_bytes())?;

    write_floats(&mut encoder, mesh.positions.iter().flatten())?;
    if let Some(normals) = mesh.normals {
        write_floats(&mut encoder, normals.iter().flatten())?;
    }
    if let Some(uvs) = mesh.uvs {
        write_floats(&mut encoder, uvs.iter().flatten())?;
    }
    if let Some(colors) = mesh.colors {
        write_floats(&mut encoder, colors.iter().flatten())?;
    }
    for &index in mesh.indices.iter().flatten() {
        encoder.write_all(&index.to_le_bytes())?;
    }

    let body = encoder.finish()?;

    let mut out = Vec::with_capacity(4 + body.len() + TRAILER_SIZE);
    out.extend_from_slice(&SERIALIZED_MAGIC.to_le_bytes());
    out.extend_from_slice(&SERIALIZED_VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    Ok(out)
}

fn write_floats<'a, W: Write>(
    w: &mut W,
    values: impl Iterator<Item = &'a f32>,
) -> std::io::Result<()> {
    for v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Decode a single-mesh `.serialized` file image.
pub fn decode(bytes: &[u8]) -> Result<(SerializedHeader, MeshBuffers), FormatError> {
    let mut outer = ByteReader::new(bytes);
    let magic = outer.u16()?;
    if magic != SERIALIZED_MAGIC {
        return Err(FormatError::BadMagic { found: magic });
    }
    let version = outer.u16()?;
    if version != SERIALIZED_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    if bytes.len() < 4 + TRAILER_SIZE {
        return Err(FormatError::UnexpectedEof(bytes.len()));
    }

    let trailer_start = bytes.len() - TRAILER_SIZE;
    let mut trailer = ByteReader::new(&bytes[trailer_start..]);
    let offset = trailer.u64()?;
    let count = trailer.u32()?;
    if offset != 0 || count != 1 {
        return Err(FormatError::InvalidHeader(format!(
            "expected one mesh at offset 0, found {} at offset {}",
            count, offset
        )));
    }

    let mut body = Vec::new();
    ZlibDecoder::new(&bytes[4..trailer_start]).read_to_end(&mut body)?;
    let mut r = ByteReader::new(&body);

    let flags = r.u32()?;
    if flags & FLAG_DOUBLE_PRECISION != 0 {
        return Err(FormatError::InvalidHeader(
            "double precision meshes are not supported".to_string(),
        ));
    }

    let mut name_bytes = Vec::new();
    loop {
        match r.u8()? {
            0 => break,
            b => name_bytes.push(b),
        }
    }
    let name = String::from_utf8(name_bytes)
        .map_err(|_| FormatError::InvalidHeader("mesh name is not UTF-8".to_string()))?;

    let vertex_count = r.u64()?;
    let triangle_count = r.u64()?;
    let header = SerializedHeader {
        flags,
        name,
        vertex_count,
        triangle_count,
    };

    let vertices = usize::try_from(vertex_count)
        .map_err(|_| FormatError::InvalidHeader(format!("vertex count {}", vertex_count)))?;
    let triangles = usize::try_from(triangle_count)
        .map_err(|_| FormatError::InvalidHeader(format!("triangle count {}", triangle_count)))?;

    // Reject counts the body cannot possibly hold before allocating.
    let remaining = body.len() - r.position();
    if vertices.saturating_mul(12).saturating_add(triangles.saturating_mul(12)) > remaining {
        return Err(FormatError::UnexpectedEof(body.len()));
    }

    let positions = (0..vertices).map(|_| r.vec3()).collect::<Result<Vec<_>, _>>()?;
    let normals = if header.has(FLAG_NORMALS) {
        Some((0..vertices).map(|_| r.vec3()).collect::<Result<Vec<_>, _>>()?)
    } else {
        None
    };
    let uvs = if header.has(FLAG_TEXCOORDS) {
        Some((0..vertices).map(|_| r.vec2()).collect::<Result<Vec<_>, _>>()?)
    } else {
        None
    };
    let colors = if header.has(FLAG_COLORS) {
        Some((0..vertices).map(|_| r.vec3()).collect::<Result<Vec<_>, _>>()?)
    } else {
        None
    };
    let indices = (0..triangles)
        .map(|_| -> Result<[u32; 3], FormatError> { Ok([r.u32()?, r.u32()?, r.u32()?]) })
        .collect::<Result<Vec<_>, _>>()?;

    let mesh = MeshBuffers {
        name: header.name.clone(),
        positions,
        normals,
        uvs,
        colors,
        indices,
    };
    mesh.view().validate()?;
    Ok((header, mesh))
}
