//! Conversion driver
//!
//! Runs one asset through the pipeline:
//!
//! ```text
//! read -> normalize -> (textures || meshes || materials) -> emit
//! ```
//!
//! Reading and normalization touch nothing on disk, so an input that fails
//! to parse leaves the output directory untouched. Once writing starts, the
//! layout is created fresh: stale `meshes/`, `textures/` and `scene.xml`
//! from an earlier run are removed first, and a failed write removes what
//! this run produced.

use std::path::{Path, PathBuf};

use mitsuba_common::layout::{MESH_DIR, SCENE_FILE, TEXTURE_DIR};
use serde::Serialize;

use crate::context::{ConversionContext, ConvertOptions};
use crate::diagnostics::{self, SubjectKind, Warning, WarningSink};
use crate::emit::{self, EmitInput, SceneFileRef};
use crate::error::ConversionError;
use crate::material::{map_materials, MappedMaterial, MappingRule};
use crate::normalize::{normalize, NormalizeSummary};
use crate::readers;
use crate::scene::Scene;
use crate::serialize::{write_meshes, MeshFileRef};
use crate::textures::{export_textures, TextureFileRef};

/// What happened to one item of the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Mesh file written
    Written,
    /// Texture copied byte for byte
    Copied,
    /// Texture decoded and re-encoded as PNG
    Converted,
    /// Material mapped by a rule
    Mapped,
    /// Material replaced by the neutral default
    Defaulted,
    /// Read and checked, nothing written
    Checked,
}

/// Per-item entry of a [`ConversionReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetEntry {
    pub kind: SubjectKind,
    pub index: usize,
    pub name: String,
    /// Scene-relative output path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<MappingRule>,
    /// Shapes referring to a mesh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<usize>,
    pub status: AssetStatus,
}

/// Outcome of one conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub success: bool,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub scene_file: Option<PathBuf>,
    /// Message of the terminal error, for failed runs
    pub error: Option<String>,
    pub normalize: Option<NormalizeSummary>,
    pub warnings: Vec<Warning>,
    pub assets: Vec<AssetEntry>,
}

impl ConversionReport {
    fn failure(input: &Path, output_dir: &Path, error: &ConversionError, warnings: Vec<Warning>) -> Self {
        Self {
            success: false,
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            scene_file: None,
            error: Some(error.to_string()),
            normalize: None,
            warnings,
            assets: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Warnings recorded as dropped features
    pub fn dropped_features(&self) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(|w| w.feature.is_some())
    }
}

/// Everything one successful run produced
struct Outputs {
    summary: NormalizeSummary,
    scene_file: Option<SceneFileRef>,
    assets: Vec<AssetEntry>,
}

/// Convert `input` into `output_dir` with default options
pub fn convert(input: &Path, output_dir: &Path) -> Result<ConversionReport, ConversionError> {
    convert_with_options(input, output_dir, ConvertOptions::default())
}

pub fn convert_with_options(
    input: &Path,
    output_dir: &Path,
    options: ConvertOptions,
) -> Result<ConversionReport, ConversionError> {
    let ctx = ConversionContext::new(output_dir, options)?;
    convert_with_context(input, &ctx)
}

pub fn convert_with_context(
    input: &Path,
    ctx: &ConversionContext,
) -> Result<ConversionReport, ConversionError> {
    let (sink, collector) = diagnostics::channel(input);
    let outputs = run(input, ctx, &sink)?;
    Ok(report(input, ctx.output_dir(), outputs, collector.drain()))
}

/// Like [`convert_with_options`], but failures are folded into the report
pub fn convert_with_report(input: &Path, output_dir: &Path, options: ConvertOptions) -> ConversionReport {
    let (sink, collector) = diagnostics::channel(input);
    let result = ConversionContext::new(output_dir, options).and_then(|ctx| run(input, &ctx, &sink));
    match result {
        Ok(outputs) => report(input, output_dir, outputs, collector.drain()),
        Err(e) => {
            tracing::error!("Conversion of {:?} failed: {}", input, e);
            ConversionReport::failure(input, output_dir, &e, collector.drain())
        }
    }
}

/// Read, normalize and map `input` without writing anything
pub fn check(input: &Path, options: ConvertOptions) -> Result<ConversionReport, ConversionError> {
    let ctx = ConversionContext::new(PathBuf::new(), options)?;
    let (sink, collector) = diagnostics::channel(input);

    let mut scene = readers::read(input, &ctx, &sink)?;
    let summary = normalize(&mut scene, ctx.options(), &sink);
    let materials = map_materials(&scene, ctx.options(), &sink);

    let instances = scene.mesh_reference_counts();
    let mut assets: Vec<AssetEntry> = scene
        .meshes
        .iter()
        .enumerate()
        .map(|(index, mesh)| AssetEntry {
            kind: SubjectKind::Mesh,
            index,
            name: mesh.name.clone(),
            output: None,
            rule: None,
            instances: Some(instances[index]),
            status: AssetStatus::Checked,
        })
        .collect();
    assets.extend(material_entries(&materials));

    Ok(report(
        input,
        ctx.output_dir(),
        Outputs {
            summary,
            scene_file: None,
            assets,
        },
        collector.drain(),
    ))
}

fn report(input: &Path, output_dir: &Path, outputs: Outputs, warnings: Vec<Warning>) -> ConversionReport {
    ConversionReport {
        success: true,
        input: input.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        scene_file: outputs.scene_file.map(|s| s.path),
        error: None,
        normalize: Some(outputs.summary),
        warnings,
        assets: outputs.assets,
    }
}

fn run(input: &Path, ctx: &ConversionContext, warnings: &WarningSink) -> Result<Outputs, ConversionError> {
    let mut scene = readers::read(input, ctx, warnings)?;
    let summary = normalize(&mut scene, ctx.options(), warnings);

    let created = prepare_output(ctx.output_dir())?;
    match write_outputs(&scene, ctx, warnings) {
        Ok((scene_file, assets)) => Ok(Outputs {
            summary,
            scene_file: Some(scene_file),
            assets,
        }),
        Err(e) => {
            clean_output(ctx.output_dir(), created);
            Err(e)
        }
    }
}

fn write_outputs(
    scene: &Scene,
    ctx: &ConversionContext,
    warnings: &WarningSink,
) -> Result<(SceneFileRef, Vec<AssetEntry>), ConversionError> {
    let (textures, (meshes, materials)) = rayon::join(
        || export_textures(scene, ctx),
        || {
            rayon::join(
                || write_meshes(scene, ctx, warnings),
                || map_materials(scene, ctx.options(), warnings),
            )
        },
    );
    let textures = textures?;
    let meshes = meshes?;

    let scene_file = emit::emit_scene(
        ctx,
        &EmitInput {
            scene,
            materials: &materials,
            mesh_files: &meshes,
            options: ctx.options(),
            warnings,
        },
    )?;

    let mut assets = mesh_entries(scene, &meshes);
    assets.extend(texture_entries(scene, &textures));
    assets.extend(material_entries(&materials));
    Ok((scene_file, assets))
}

fn mesh_entries(scene: &Scene, meshes: &[MeshFileRef]) -> Vec<AssetEntry> {
    let instances = scene.mesh_reference_counts();
    meshes
        .iter()
        .map(|file| AssetEntry {
            kind: SubjectKind::Mesh,
            index: file.mesh.index(),
            name: scene.meshes[file.mesh.index()].name.clone(),
            output: Some(file.path.clone()),
            rule: None,
            instances: Some(instances[file.mesh.index()]),
            status: AssetStatus::Written,
        })
        .collect()
}

fn texture_entries(scene: &Scene, textures: &[TextureFileRef]) -> Vec<AssetEntry> {
    textures
        .iter()
        .map(|file| AssetEntry {
            kind: SubjectKind::Texture,
            index: file.texture.index(),
            name: scene.textures[file.texture.index()].name.clone(),
            output: Some(file.path.clone()),
            rule: None,
            instances: None,
            status: if file.converted {
                AssetStatus::Converted
            } else {
                AssetStatus::Copied
            },
        })
        .collect()
}

fn material_entries(materials: &[MappedMaterial]) -> Vec<AssetEntry> {
    materials
        .iter()
        .enumerate()
        .map(|(index, material)| AssetEntry {
            kind: SubjectKind::Material,
            index,
            name: material.name.clone(),
            output: None,
            rule: Some(material.rule),
            instances: None,
            status: if material.rule == MappingRule::Default {
                AssetStatus::Defaulted
            } else {
                AssetStatus::Mapped
            },
        })
        .collect()
}

/// Create the output directory or clear this tool's files from it.
///
/// Returns whether the directory was created by this call.
fn prepare_output(dir: &Path) -> Result<bool, ConversionError> {
    let created = !dir.exists();
    if created {
        std::fs::create_dir_all(dir).map_err(|e| ConversionError::io(dir, e))?;
    }
    remove_layout(dir)?;
    Ok(created)
}

fn remove_layout(dir: &Path) -> Result<(), ConversionError> {
    for sub in [MESH_DIR, TEXTURE_DIR] {
        let path = dir.join(sub);
        if path.is_dir() {
            std::fs::remove_dir_all(&path).map_err(|e| ConversionError::io(&path, e))?;
        }
    }
    let scene = dir.join(SCENE_FILE);
    if scene.is_file() {
        std::fs::remove_file(&scene).map_err(|e| ConversionError::io(&scene, e))?;
    }
    Ok(())
}

/// Best-effort removal of a partial output after a failed write
fn clean_output(dir: &Path, created: bool) {
    if let Err(e) = remove_layout(dir) {
        tracing::warn!("Could not clean up {:?}: {}", dir, e);
    }
    if created {
        // Only removes the directory if nothing else landed in it.
        let _ = std::fs::remove_dir(dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TRIANGLE_OBJ: &str = "o tri\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    #[test]
    fn test_convert_obj_writes_layout() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tri.obj");
        std::fs::write(&input, TRIANGLE_OBJ).unwrap();
        let out = dir.path().join("out");

        let report = convert(&input, &out).unwrap();
        assert!(report.success);
        assert_eq!(report.scene_file.as_deref(), Some(out.join(SCENE_FILE).as_path()));
        assert!(out.join("meshes/tri.serialized").is_file());
        assert_eq!(report.assets.len(), 1);
        assert_eq!(report.assets[0].status, AssetStatus::Written);
    }

    #[test]
    fn test_stale_files_are_replaced() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tri.obj");
        std::fs::write(&input, TRIANGLE_OBJ).unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join(MESH_DIR)).unwrap();
        std::fs::write(out.join("meshes/stale.serialized"), b"old").unwrap();
        std::fs::write(out.join("notes.txt"), b"keep").unwrap();

        convert(&input, &out).unwrap();
        assert!(!out.join("meshes/stale.serialized").exists());
        assert!(out.join("notes.txt").is_file());
    }

    #[test]
    fn test_parse_failure_writes_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("bad.obj");
        std::fs::write(&input, "v 0 0 0\nf 1 2 3\n").unwrap();
        let out = dir.path().join("out");

        let err = convert(&input, &out).unwrap_err();
        assert!(err.is_parse());
        assert!(!out.exists());
    }

    #[test]
    fn test_report_folds_failure() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("missing.obj");
        let report = convert_with_report(&input, &dir.path().join("out"), ConvertOptions::default());
        assert!(!report.success);
        assert!(report.error.is_some());
        assert!(report.to_json().unwrap().contains("\"success\": false"));
    }

    #[test]
    fn test_check_writes_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tri.obj");
        std::fs::write(&input, TRIANGLE_OBJ).unwrap();

        let report = check(&input, ConvertOptions::default()).unwrap();
        assert!(report.success);
        assert!(report.scene_file.is_none());
        assert_eq!(report.assets[0].status, AssetStatus::Checked);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
