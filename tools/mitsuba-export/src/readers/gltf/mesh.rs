//! Primitive decoding and buffer bounds checks

use std::path::Path;

use gltf::mesh::Mode;

use crate::diagnostics::{Stage, Subject, WarningSink};
use crate::error::ParseError;
use crate::scene::MeshAttributes;

/// Fail if any buffer view or accessor reaches outside its storage.
///
/// The `gltf` accessor readers slice buffers directly, so this has to run
/// before any of them.
pub(super) fn check_buffer_bounds(
    path: &Path,
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> Result<(), ParseError> {
    for view in document.views() {
        let buffer_len = buffers
            .get(view.buffer().index())
            .map(|data| data.len())
            .ok_or_else(|| {
                ParseError::new(
                    path,
                    format!("bufferView {} references missing buffer {}", view.index(), view.buffer().index()),
                )
            })?;
        let end = view.offset().checked_add(view.length());
        if end.map_or(true, |end| end > buffer_len) {
            return Err(ParseError::new(
                path,
                format!(
                    "bufferView {} (offset {}, length {}) exceeds buffer {} of {} bytes",
                    view.index(),
                    view.offset(),
                    view.length(),
                    view.buffer().index(),
                    buffer_len
                ),
            )
            .at_offset(view.offset() as u64));
        }
    }

    for accessor in document.accessors() {
        if let Some(view) = accessor.view() {
            let count = accessor.count();
            if count > 0 {
                let element = accessor.size();
                let stride = view.stride().unwrap_or(element);
                let needed = (count - 1)
                    .checked_mul(stride)
                    .and_then(|n| n.checked_add(element))
                    .and_then(|n| n.checked_add(accessor.offset()));
                if needed.map_or(true, |needed| needed > view.length()) {
                    return Err(ParseError::new(
                        path,
                        format!(
                            "accessor {} ({} elements of {} bytes) overruns bufferView {} of {} bytes",
                            accessor.index(),
                            count,
                            element,
                            view.index(),
                            view.length()
                        ),
                    ));
                }
            }
        }

        if let Some(sparse) = accessor.sparse() {
            let count = sparse.count();
            let indices = sparse.indices();
            let values = sparse.values();
            let index_bytes = count
                .checked_mul(indices.index_type().size())
                .and_then(|n| n.checked_add(indices.offset()));
            let value_bytes = count
                .checked_mul(accessor.size())
                .and_then(|n| n.checked_add(values.offset()));
            if index_bytes.map_or(true, |n| n > indices.view().length())
                || value_bytes.map_or(true, |n| n > values.view().length())
            {
                return Err(ParseError::new(
                    path,
                    format!("sparse accessor {} overruns its buffer views", accessor.index()),
                ));
            }
        }
    }
    Ok(())
}

/// Decode one primitive. `Ok(None)` means the primitive was dropped with a warning.
pub(super) fn read_primitive(
    path: &Path,
    name: &str,
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
    warnings: &WarningSink,
    subject: &Subject,
) -> Result<Option<MeshAttributes>, ParseError> {
    let mode = primitive.mode();
    match mode {
        Mode::Triangles | Mode::TriangleStrip | Mode::TriangleFan => {}
        other => {
            warnings.dropped(
                Stage::Read,
                subject.clone(),
                "non-triangle primitive",
                format!("primitive {} uses {:?} mode and was dropped", primitive.index(), other),
            );
            return Ok(None);
        }
    }

    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| {
            ParseError::new(
                path,
                format!("mesh '{}' primitive {} has no POSITION attribute", name, primitive.index()),
            )
        })?
        .collect();

    let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|n| n.collect());

    let mut uv_sets = Vec::new();
    let mut set = 0;
    while let Some(tex_coords) = reader.read_tex_coords(set) {
        uv_sets.push(tex_coords.into_f32().collect::<Vec<[f32; 2]>>());
        set += 1;
    }

    let colors: Option<Vec<[f32; 4]>> = reader.read_colors(0).map(|c| c.into_rgba_f32().collect());

    let flat: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };

    let indices = triangulate(mode, &flat).map_err(|reason| {
        ParseError::new(
            path,
            format!("mesh '{}' primitive {}: {}", name, primitive.index(), reason),
        )
    })?;

    if indices.is_empty() {
        warnings.warn(
            Stage::Read,
            subject.clone(),
            format!("primitive {} has no triangles and was dropped", primitive.index()),
        );
        return Ok(None);
    }

    Ok(Some(MeshAttributes {
        positions,
        normals,
        uv_sets,
        colors,
        indices,
    }))
}

/// Convert a list, strip, or fan index sequence into a triangle list
pub(super) fn triangulate(mode: Mode, flat: &[u32]) -> Result<Vec<[u32; 3]>, String> {
    match mode {
        Mode::Triangles => {
            if flat.len() % 3 != 0 {
                return Err(format!(
                    "triangle list has {} indices, not a multiple of 3",
                    flat.len()
                ));
            }
            Ok(flat.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect())
        }
        Mode::TriangleStrip => Ok((0..flat.len().saturating_sub(2))
            .map(|i| {
                if i % 2 == 0 {
                    [flat[i], flat[i + 1], flat[i + 2]]
                } else {
                    [flat[i + 1], flat[i], flat[i + 2]]
                }
            })
            // Strips use repeated indices to stitch runs together.
            .filter(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
            .collect()),
        Mode::TriangleFan => Ok((1..flat.len().saturating_sub(1))
            .map(|i| [flat[i], flat[i + 1], flat[0]])
            .collect()),
        other => Err(format!("{:?} is not a triangle mode", other)),
    }
}
