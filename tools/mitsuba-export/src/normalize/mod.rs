//! Normalization pass
//!
//! Brings a freshly read [`Scene`] into the target conventions, in place
//! and in a fixed order:
//!
//! 1. axis remap (and UV origin)
//! 2. winding correction when the remap mirrors
//! 3. per-mesh vertex welding, then duplicate face removal
//! 4. texture then material dedup
//! 5. texture output paths
//! 6. hierarchy flattening (when configured)
//!
//! Every step records the state it reached on the scene or leaves data in
//! a fixed point, so running the pass again changes nothing.

mod axes;
mod dedup;
mod paths;

pub use axes::{convert_axes, remap_matrix};
pub use dedup::{dedup_faces, dedup_materials, dedup_textures, dedup_vertices};
pub use paths::{assign_texture_paths, export_mode, TextureExport};

use rayon::prelude::*;
use serde::Serialize;

use crate::context::{ConvertOptions, HierarchyMode};
use crate::diagnostics::{Stage, Subject, WarningSink};
use crate::scene::{Convention, Handedness, Scene, UvOrigin};

/// What one normalization run changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
    pub axes_remapped: bool,
    pub winding_flipped: bool,
    pub uv_flipped: bool,
    pub vertices_removed: usize,
    pub faces_removed: usize,
    pub textures_merged: usize,
    pub materials_merged: usize,
}

/// Convention every normalized scene ends up in
pub fn target_convention(options: &ConvertOptions) -> Convention {
    Convention {
        up: options.target_up_axis,
        handedness: if options.flip_handedness {
            Handedness::Left
        } else {
            Handedness::Right
        },
    }
}

pub fn target_uv_origin(options: &ConvertOptions) -> UvOrigin {
    if options.flip_uv {
        UvOrigin::BottomLeft
    } else {
        UvOrigin::TopLeft
    }
}

/// Run the whole pass on `scene`
pub fn normalize(
    scene: &mut Scene,
    options: &ConvertOptions,
    warnings: &WarningSink,
) -> NormalizeSummary {
    let mut summary = NormalizeSummary::default();

    let source = scene.convention;
    let r = convert_axes(scene, target_convention(options));
    summary.axes_remapped = source != scene.convention;

    let uv_target = target_uv_origin(options);
    if scene.uv_origin != uv_target {
        scene.meshes.par_iter_mut().for_each(|mesh| mesh.flip_v());
        scene.uv_origin = uv_target;
        summary.uv_flipped = true;
    }

    if r.determinant() < 0.0 {
        scene.meshes.par_iter_mut().for_each(|mesh| mesh.flip_winding());
        summary.winding_flipped = true;
    }

    let epsilon = options.dedup_epsilon;
    let removed: Vec<(usize, usize)> = scene
        .meshes
        .par_iter_mut()
        .enumerate()
        .map(|(index, mesh)| {
            let welded = dedup_vertices(mesh, epsilon).and_then(|vertices| {
                let faces = dedup_faces(mesh)?;
                Ok((vertices, faces))
            });
            match welded {
                Ok((vertices, faces)) => {
                    if faces > 0 {
                        tracing::debug!("'{}': dropped {} duplicate face(s)", mesh.name, faces);
                    }
                    (vertices, faces)
                }
                Err(e) => {
                    warnings.warn(
                        Stage::Normalize,
                        Subject::mesh(index, mesh.name.clone()),
                        format!("vertex welding skipped: {}", e),
                    );
                    (0, 0)
                }
            }
        })
        .collect();
    summary.vertices_removed = removed.iter().map(|(v, _)| v).sum();
    summary.faces_removed = removed.iter().map(|(_, f)| f).sum();

    summary.textures_merged = dedup_textures(scene);
    summary.materials_merged = dedup_materials(scene);

    assign_texture_paths(&mut scene.textures);

    if options.hierarchy == HierarchyMode::Flatten {
        scene.flatten();
    }

    tracing::info!(
        "Normalized '{}': remap={}, winding_flip={}, uv_flip={}, -{} vertices, -{} faces, -{} textures, -{} materials",
        scene.name,
        summary.axes_remapped,
        summary.winding_flipped,
        summary.uv_flipped,
        summary.vertices_removed,
        summary.faces_removed,
        summary.textures_merged,
        summary.materials_merged
    );
    summary
}
