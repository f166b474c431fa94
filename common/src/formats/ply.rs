//! Binary little-endian PLY (.ply)
//!
//! Only the subset Mitsuba's PLY loader needs is produced:
//!
//! ```text
//! ply
//! format binary_little_endian 1.0
//! comment generated by mitsuba-export
//! comment mesh <name>
//! element vertex <N>
//! property float x / y / z
//! property float nx / ny / nz        (if normals)
//! property float u / v               (if texcoords)
//! property float r / g / b           (if colors)
//! element face <M>
//! property list uchar uint vertex_indices
//! end_header
//! <N interleaved vertices><M faces, each: u8 3, 3 * u32>
//! ```

use std::fmt::Write as _;

use super::{ByteReader, FormatError, MeshBuffers, MeshView};

pub const PLY_COMMENT: &str = "generated by mitsuba-export";

const END_HEADER: &str = "end_header\n";

/// Parsed PLY header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyHeader {
    pub name: String,
    pub vertex_count: usize,
    pub face_count: usize,
    pub vertex_properties: Vec<String>,
}

impl PlyHeader {
    pub fn has_property(&self, name: &str) -> bool {
        self.vertex_properties.iter().any(|p| p == name)
    }
}

fn property_names(mesh: &MeshView<'_>) -> Vec<&'static str> {
    let mut names = vec!["x", "y", "z"];
    if mesh.normals.is_some() {
        names.extend(["nx", "ny", "nz"]);
    }
    if mesh.uvs.is_some() {
        names.extend(["u", "v"]);
    }
    if mesh.colors.is_some() {
        names.extend(["r", "g", "b"]);
    }
    names
}

/// Encode a mesh into a complete PLY file image.
pub fn encode(mesh: &MeshView<'_>) -> Result<Vec<u8>, FormatError> {
    mesh.validate()?;
    if mesh.name.contains(['\n', '\r']) {
        return Err(FormatError::InvalidHeader(format!(
            "mesh name {:?} contains a line break",
            mesh.name
        )));
    }

    let mut header = String::new();
    header.push_str("ply\nformat binary_little_endian 1.0\n");
    let _ = writeln!(header, "comment {}", PLY_COMMENT);
    if !mesh.name.is_empty() {
        let _ = writeln!(header, "comment mesh {}", mesh.name);
    }
    let _ = writeln!(header, "element vertex {}", mesh.positions.len());
    for name in property_names(mesh) {
        let _ = writeln!(header, "property float {}", name);
    }
    let _ = writeln!(header, "element face {}", mesh.indices.len());
    header.push_str("property list uchar uint vertex_indices\n");
    header.push_str(END_HEADER);

    let floats_per_vertex = property_names(mesh).len();
    let mut out = Vec::with_capacity(
        header.len() + mesh.positions.len() * floats_per_vertex * 4 + mesh.indices.len() * 13,
    );
    out.extend_from_slice(header.as_bytes());

    for (i, p) in mesh.positions.iter().enumerate() {
        push_floats(&mut out, p);
        if let Some(normals) = mesh.normals {
            push_floats(&mut out, &normals[i]);
        }
        if let Some(uvs) = mesh.uvs {
            push_floats(&mut out, &uvs[i]);
        }
        if let Some(colors) = mesh.colors {
            push_floats(&mut out, &colors[i]);
        }
    }
    for tri in mesh.indices {
        out.push(3);
        for index in tri {
            out.extend_from_slice(&index.to_le_bytes());
        }
    }
    Ok(out)
}

fn push_floats(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Parse the ASCII header, returning it and the offset of the binary payload.
pub fn parse_header(bytes: &[u8]) -> Result<(PlyHeader, usize), FormatError> {
    let end = find(bytes, END_HEADER.as_bytes())
        .ok_or_else(|| FormatError::InvalidHeader("missing end_header".to_string()))?;
    let body_start = end + END_HEADER.len();
    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|_| FormatError::InvalidHeader("header is not ASCII".to_string()))?;

    let mut lines = text.lines();
    if lines.next() != Some("ply") {
        return Err(FormatError::InvalidHeader("missing 'ply' signature".to_string()));
    }

    let mut header = PlyHeader {
        name: String::new(),
        vertex_count: 0,
        face_count: 0,
        vertex_properties: Vec::new(),
    };
    let mut current_element = "";

    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["format", "binary_little_endian", "1.0"] => {}
            ["format", other, ..] => {
                return Err(FormatError::InvalidHeader(format!(
                    "unsupported PLY format '{}'",
                    other
                )))
            }
            ["comment", "mesh", name @ ..] => header.name = name.join(" "),
            ["comment", ..] => {}
            ["element", kind, count] => {
                let count: usize = count.parse().map_err(|_| {
                    FormatError::InvalidHeader(format!("bad element count '{}'", count))
                })?;
                match *kind {
                    "vertex" => header.vertex_count = count,
                    "face" => header.face_count = count,
                    other => {
                        return Err(FormatError::InvalidHeader(format!(
                            "unsupported element '{}'",
                            other
                        )))
                    }
                }
                current_element = *kind;
            }
            ["property", "float", name] if current_element == "vertex" => {
                header.vertex_properties.push(name.to_string());
            }
            ["property", "list", "uchar", "uint", "vertex_indices"] if current_element == "face" => {}
            _ => {
                return Err(FormatError::InvalidHeader(format!(
                    "unsupported header line '{}'",
                    line
                )))
            }
        }
    }

    Ok((header, body_start))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decode a PLY file image produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<(PlyHeader, MeshBuffers), FormatError> {
    let (header, body_start) = parse_header(bytes)?;
    let props = &header.vertex_properties;
    if props.len() < 3 || props[..3] != ["x", "y", "z"] {
        return Err(FormatError::InvalidHeader(
            "vertex element must start with x y z".to_string(),
        ));
    }

    let mut r = ByteReader::new(&bytes[body_start..]);
    let has_normals = header.has_property("nx");
    let has_uvs = header.has_property("u");
    let has_colors = header.has_property("r");

    let mut mesh = MeshBuffers {
        name: header.name.clone(),
        ..Default::default()
    };
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut colors = Vec::new();

    for _ in 0..header.vertex_count {
        mesh.positions.push(r.vec3()?);
        if has_normals {
            normals.push(r.vec3()?);
        }
        if has_uvs {
            uvs.push(r.vec2()?);
        }
        if has_colors {
            colors.push(r.vec3()?);
        }
    }
    for face in 0..header.face_count {
        let arity = r.u8()?;
        if arity != 3 {
            return Err(FormatError::InvalidHeader(format!(
                "face {} has {} vertices, expected 3",
                face, arity
            )));
        }
        mesh.indices.push([r.u32()?, r.u32()?, r.u32()?]);
    }

    mesh.normals = has_normals.then_some(normals);
    mesh.uvs = has_uvs.then_some(uvs);
    mesh.colors = has_colors.then_some(colors);
    mesh.view().validate()?;
    Ok((header, mesh))
}
