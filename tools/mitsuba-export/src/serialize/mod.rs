//! Mesh serialization
//!
//! One file per unique mesh under `meshes/`, in the configured format. File
//! names come from mesh names through their own [`IdAllocator`], in mesh
//! table order, so they do not depend on how many nodes instance a mesh.

use std::path::Path;

use mitsuba_common::layout::{scene_relative, MESH_DIR};
use mitsuba_common::MeshView;
use rayon::prelude::*;
use serde::Serialize;

use crate::context::{ConversionContext, MeshFormat};
use crate::diagnostics::{Stage, Subject, WarningSink};
use crate::error::ConversionError;
use crate::naming::IdAllocator;
use crate::scene::{Mesh, MeshId, Scene};

/// A mesh file written to the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeshFileRef {
    pub mesh: MeshId,
    /// Scene-relative path, e.g. `meshes/cube.serialized`
    pub path: String,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub has_normals: bool,
    pub bytes: usize,
}

/// Scene-relative file path of every mesh, indexed by mesh id
pub fn plan_mesh_paths(scene: &Scene, format: MeshFormat) -> Vec<String> {
    let mut names = IdAllocator::new();
    scene
        .meshes
        .iter()
        .map(|mesh| {
            let stem = names.allocate(&mesh.name, "mesh");
            scene_relative(MESH_DIR, &format!("{}.{}", stem, format.extension()))
        })
        .collect()
}

/// Encode one mesh. Only the first UV set is kept and colors lose alpha.
pub fn encode_mesh(
    index: usize,
    mesh: &Mesh,
    format: MeshFormat,
    warnings: &WarningSink,
) -> Result<Vec<u8>, ConversionError> {
    let subject = Subject::mesh(index, mesh.name.clone());
    let uv_sets = mesh.uv_sets();
    if uv_sets.len() > 1 {
        warnings.dropped(
            Stage::Serialize,
            subject.clone(),
            "extra UV sets",
            format!("{} additional UV set(s) dropped; only set 0 is written", uv_sets.len() - 1),
        );
    }

    let colors: Option<Vec<[f32; 3]>> = mesh.colors().map(|colors| {
        if colors.iter().any(|c| c[3] != 1.0) {
            warnings.dropped(
                Stage::Serialize,
                subject.clone(),
                "vertex color alpha",
                "vertex color alpha dropped",
            );
        }
        colors.iter().map(|c| [c[0], c[1], c[2]]).collect()
    });

    let view = MeshView {
        name: &mesh.name,
        positions: mesh.positions(),
        normals: mesh.normals(),
        uvs: uv_sets.first().map(Vec::as_slice),
        colors: colors.as_deref(),
        indices: mesh.indices(),
    };
    format
        .encode(&view)
        .map_err(|source| ConversionError::MeshEncoding {
            mesh: mesh.name.clone(),
            source,
        })
}

/// Write one mesh to `<output>/<path>`
pub fn write_mesh(
    index: usize,
    mesh: &Mesh,
    path: &str,
    ctx: &ConversionContext,
    warnings: &WarningSink,
) -> Result<MeshFileRef, ConversionError> {
    let bytes = encode_mesh(index, mesh, ctx.options().mesh_format, warnings)?;
    let target = ctx.output_dir().join(path);
    write_file(&target, &bytes)?;
    tracing::debug!(
        "Wrote {}: {} vertices, {} triangles, {} bytes",
        path,
        mesh.vertex_count(),
        mesh.triangle_count(),
        bytes.len()
    );
    Ok(MeshFileRef {
        mesh: MeshId(index),
        path: path.to_string(),
        vertex_count: mesh.vertex_count(),
        triangle_count: mesh.triangle_count(),
        has_normals: mesh.normals().is_some(),
        bytes: bytes.len(),
    })
}

/// Write every mesh of the scene in parallel; results are in mesh order
pub fn write_meshes(
    scene: &Scene,
    ctx: &ConversionContext,
    warnings: &WarningSink,
) -> Result<Vec<MeshFileRef>, ConversionError> {
    let paths = plan_mesh_paths(scene, ctx.options().mesh_format);
    let dir = ctx.output_dir().join(MESH_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| ConversionError::io(&dir, e))?;

    let refs = scene
        .meshes
        .par_iter()
        .zip(paths.par_iter())
        .enumerate()
        .map(|(index, (mesh, path))| write_mesh(index, mesh, path, ctx, warnings))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!("Serialized {} meshes", refs.len());
    Ok(refs)
}

pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ConversionError> {
    std::fs::write(path, bytes).map_err(|e| ConversionError::io(path, e))
}
