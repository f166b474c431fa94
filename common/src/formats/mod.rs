//! Binary mesh formats consumed by Mitsuba
//!
//! Both formats store the same attribute set in the same fixed order:
//! position, normal, texcoord, color, then the triangle index buffer.
//! Only present attributes are written; presence is flagged in the header.
//! All multi-byte values are little-endian.

pub mod ply;
pub mod serialized;

/// Errors raised while encoding or decoding a mesh file
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("attribute '{attribute}' has {actual} entries, expected {expected}")]
    AttributeLength {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("triangle {triangle} references vertex {index}, but mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("bad magic number 0x{found:04X}")]
    BadMagic { found: u16 },

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("unexpected end of data at offset {0}")]
    UnexpectedEof(usize),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Borrowed view of one mesh, ready for encoding
#[derive(Debug, Clone, Copy)]
pub struct MeshView<'a> {
    pub name: &'a str,
    pub positions: &'a [[f32; 3]],
    pub normals: Option<&'a [[f32; 3]]>,
    pub uvs: Option<&'a [[f32; 2]]>,
    pub colors: Option<&'a [[f32; 3]]>,
    pub indices: &'a [[u32; 3]],
}

impl MeshView<'_> {
    /// Check attribute lengths and index range.
    pub fn validate(&self) -> Result<(), FormatError> {
        let vertex_count = self.positions.len();
        check_len("normal", vertex_count, self.normals.map(<[_]>::len))?;
        check_len("texcoord", vertex_count, self.uvs.map(<[_]>::len))?;
        check_len("color", vertex_count, self.colors.map(<[_]>::len))?;

        for (triangle, tri) in self.indices.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(FormatError::IndexOutOfRange {
                    triangle,
                    index,
                    vertex_count,
                });
            }
        }
        Ok(())
    }
}

fn check_len(
    attribute: &'static str,
    expected: usize,
    actual: Option<usize>,
) -> Result<(), FormatError> {
    match actual {
        Some(actual) if actual != expected => Err(FormatError::AttributeLength {
            attribute,
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

/// Owned mesh data, as produced by the decoders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuffers {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 3]>>,
    pub indices: Vec<[u32; 3]>,
}

impl MeshBuffers {
    pub fn view(&self) -> MeshView<'_> {
        MeshView {
            name: &self.name,
            positions: &self.positions,
            normals: self.normals.as_deref(),
            uvs: self.uvs.as_deref(),
            colors: self.colors.as_deref(),
            indices: &self.indices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }
}

/// Decode either mesh format, sniffed from the leading bytes.
pub fn decode_mesh(bytes: &[u8]) -> Result<MeshBuffers, FormatError> {
    if bytes.starts_with(b"ply") {
        ply::decode(bytes).map(|(_, mesh)| mesh)
    } else {
        serialized::decode(bytes).map(|(_, mesh)| mesh)
    }
}

/// Little-endian cursor over a byte slice
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(FormatError::UnexpectedEof(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, FormatError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, FormatError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, FormatError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    pub(crate) fn f32(&mut self) -> Result<f32, FormatError> {
        self.u32().map(f32::from_bits)
    }

    pub(crate) fn vec3(&mut self) -> Result<[f32; 3], FormatError> {
        Ok([self.f32()?, self.f32()?, self.f32()?])
    }

    pub(crate) fn vec2(&mut self) -> Result<[f32; 2], FormatError> {
        Ok([self.f32()?, self.f32()?])
    }
}
