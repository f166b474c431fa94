//! Wavefront OBJ reader
//!
//! OBJ carries no coordinate convention. The scene is tagged with the
//! configured `obj_up_axis` (right-handed) and a bottom-left UV origin, and
//! normalization maps it from there.
//!
//! Every `(group, material)` pair becomes one mesh under its own root node.
//! Corners are welded on their `(v, vt, vn)` triple within a mesh; faces
//! with more than three corners are fan-triangulated.

mod mtl;

pub use mtl::{mtl_opacity, parse_mtl, MapStatement, MtlMaterial};

use std::path::Path;

use glam::Mat4;
use hashbrown::{HashMap, HashSet};

use super::{read_bytes, resolve_reference, stem_or, FormatReader};
use crate::context::{ConversionContext, UpAxis};
use crate::diagnostics::{Stage, Subject, WarningSink};
use crate::error::{ConversionError, ParseError};
use crate::scene::{
    Convention, Handedness, MaterialId, Mesh, MeshAttributes, Scene, SceneNode, SourceFormat,
    UvOrigin,
};

pub struct ObjReader;

impl FormatReader for ObjReader {
    fn read(
        &self,
        path: &Path,
        ctx: &ConversionContext,
        warnings: &WarningSink,
    ) -> Result<Scene, ConversionError> {
        let bytes = read_bytes(path)?;
        let source = String::from_utf8_lossy(&bytes);
        Ok(read_obj(path, &source, ctx.options().obj_up_axis, warnings)?)
    }
}

/// 0-based `(position, texcoord, normal)` indices of one face corner
type Corner = (u32, Option<u32>, Option<u32>);

/// Triangles between consecutive `g`/`o`/`usemtl` switches
struct Run {
    group: String,
    material: Option<String>,
    /// Three corners per triangle
    corners: Vec<Corner>,
}

#[derive(Default)]
struct ObjData {
    positions: Vec<[f32; 3]>,
    colors: Vec<Option<[f32; 3]>>,
    texcoords: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
    runs: Vec<Run>,
    libraries: Vec<std::path::PathBuf>,
}

/// Parse OBJ text whose `mtllib` references resolve next to `path`
pub fn read_obj(
    path: &Path,
    source: &str,
    up: UpAxis,
    warnings: &WarningSink,
) -> Result<Scene, ParseError> {
    let default_group = stem_or(path, "default");
    let data = parse_obj(path, source, &default_group, warnings)?;

    let mut library = Vec::new();
    for lib_path in &data.libraries {
        let bytes = std::fs::read(lib_path)
            .map_err(|e| ParseError::new(lib_path, format!("cannot read material library: {}", e)))?;
        library.extend(parse_mtl(lib_path, &String::from_utf8_lossy(&bytes))?);
    }

    let builder = ObjBuilder {
        path,
        library: &library,
        material_ids: HashMap::new(),
        scene: Scene::new(
            default_group,
            path,
            SourceFormat::Obj,
            Convention {
                up,
                handedness: Handedness::Right,
            },
            UvOrigin::BottomLeft,
        ),
        warnings,
    };
    builder.build(data)
}

fn parse_obj(
    path: &Path,
    source: &str,
    default_group: &str,
    warnings: &WarningSink,
) -> Result<ObjData, ParseError> {
    let mut data = ObjData::default();
    let mut run_index: HashMap<(String, Option<String>), usize> = HashMap::new();
    let mut group = default_group.to_string();
    let mut material: Option<String> = None;
    let mut reported: HashSet<String> = HashSet::new();

    for (number, line) in source.lines().enumerate() {
        let line_no = number + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .unwrap_or((line, ""));
        let err = |reason: String| ParseError::new(path, reason).at_line(line_no);
        let numbers = || {
            parse_floats(rest.split_whitespace())
                .map_err(|token| err(format!("invalid number '{}' in '{}'", token, keyword)))
        };

        match keyword {
            "v" => {
                let v = numbers()?;
                let color = match v.len() {
                    3 | 4 => None,
                    6 | 7 => Some([v[3], v[4], v[5]]),
                    n => return Err(err(format!("vertex has {} components", n))),
                };
                data.positions.push([v[0], v[1], v[2]]);
                data.colors.push(color);
            }
            "vt" => {
                let v = numbers()?;
                if v.is_empty() || v.len() > 3 {
                    return Err(err(format!("texture coordinate has {} components", v.len())));
                }
                data.texcoords.push([v[0], v.get(1).copied().unwrap_or(0.0)]);
            }
            "vn" => {
                let v = numbers()?;
                if v.len() != 3 {
                    return Err(err(format!("normal has {} components", v.len())));
                }
                data.normals.push([v[0], v[1], v[2]]);
            }
            "f" => {
                let corners = rest
                    .split_whitespace()
                    .map(|token| parse_corner(token, &data).map_err(&err))
                    .collect::<Result<Vec<Corner>, ParseError>>()?;
                if corners.len() < 3 {
                    return Err(err(format!("face has {} vertices", corners.len())));
                }
                let key = (group.clone(), material.clone());
                let index = *run_index.entry(key).or_insert_with(|| {
                    data.runs.push(Run {
                        group: group.clone(),
                        material: material.clone(),
                        corners: Vec::new(),
                    });
                    data.runs.len() - 1
                });
                let run = &mut data.runs[index];
                for i in 1..corners.len() - 1 {
                    run.corners
                        .extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                }
            }
            "g" | "o" => {
                group = if rest.is_empty() {
                    default_group.to_string()
                } else {
                    rest.to_string()
                };
            }
            "usemtl" => {
                if rest.is_empty() {
                    return Err(err("usemtl without a name".to_string()));
                }
                material = Some(rest.to_string());
            }
            "mtllib" => {
                if rest.is_empty() {
                    return Err(err("mtllib without a file name".to_string()));
                }
                // Names may contain spaces; fall back to a list only if the whole name is missing.
                match resolve_reference(path, rest) {
                    Ok(lib) => data.libraries.push(lib),
                    Err(_) => {
                        for name in rest.split_whitespace() {
                            let lib = resolve_reference(path, name).map_err(|e| e.at_line(line_no))?;
                            data.libraries.push(lib);
                        }
                    }
                }
            }
            "s" => {}
            "l" | "p" => {
                if reported.insert(keyword.to_string()) {
                    let what = if keyword == "l" { "line" } else { "point" };
                    warnings.dropped(
                        Stage::Read,
                        Subject::asset(),
                        format!("{} elements", what),
                        format!("{} elements are not renderable and were dropped", what),
                    );
                }
            }
            "vp" | "cstype" | "deg" | "curv" | "curv2" | "surf" | "parm" | "trim" | "hole"
            | "end" => {
                if reported.insert("free-form".to_string()) {
                    warnings.dropped(
                        Stage::Read,
                        Subject::asset(),
                        "free-form geometry",
                        "curves and surfaces were dropped",
                    );
                }
            }
            other => {
                if reported.insert(other.to_string()) {
                    warnings.warn(
                        Stage::Read,
                        Subject::asset(),
                        format!("unrecognized statement '{}' (line {}) ignored", other, line_no),
                    );
                }
            }
        }
    }

    if data.runs.is_empty() {
        return Err(ParseError::new(path, "file contains no faces"));
    }
    Ok(data)
}

/// Parse `v`, `v/vt`, `v//vn` or `v/vt/vn`; negative indices count back from the end
fn parse_corner(token: &str, data: &ObjData) -> Result<Corner, String> {
    let mut parts = token.split('/');
    let v = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("malformed face vertex '{}'", token))?;
    let vt = parts.next().filter(|s| !s.is_empty());
    let vn = parts.next().filter(|s| !s.is_empty());
    if parts.next().is_some() {
        return Err(format!("malformed face vertex '{}'", token));
    }

    let v = resolve_index(v, data.positions.len(), "vertex")?;
    let vt = vt
        .map(|s| resolve_index(s, data.texcoords.len(), "texture coordinate"))
        .transpose()?;
    let vn = vn
        .map(|s| resolve_index(s, data.normals.len(), "normal"))
        .transpose()?;
    Ok((v, vt, vn))
}

fn resolve_index(token: &str, count: usize, what: &str) -> Result<u32, String> {
    let raw: i64 = token
        .parse()
        .map_err(|_| format!("invalid {} index '{}'", what, token))?;
    let resolved = match raw {
        0 => None,
        i if i > 0 => Some(i - 1),
        i => Some(count as i64 + i),
    };
    match resolved {
        Some(i) if i >= 0 && (i as usize) < count => Ok(i as u32),
        _ => Err(format!(
            "{} index {} out of range ({} defined)",
            what, raw, count
        )),
    }
}

/// Parse every token as `f32`, returning the first bad token on failure
pub(super) fn parse_floats<'a>(
    tokens: impl Iterator<Item = &'a str>,
) -> Result<Vec<f32>, &'a str> {
    tokens
        .map(|t| t.parse::<f32>().ok().filter(|v| v.is_finite()).ok_or(t))
        .collect()
}

/// Turns parsed OBJ data into a [`Scene`]
struct ObjBuilder<'a> {
    path: &'a Path,
    library: &'a [MtlMaterial],
    material_ids: HashMap<String, MaterialId>,
    scene: Scene,
    warnings: &'a WarningSink,
}

impl ObjBuilder<'_> {
    fn build(mut self, data: ObjData) -> Result<Scene, ParseError> {
        let mut group_runs: HashMap<&str, usize> = HashMap::new();
        for run in &data.runs {
            *group_runs.entry(run.group.as_str()).or_default() += 1;
        }

        let mut missing: HashSet<&str> = HashSet::new();
        for run in &data.runs {
            let name = if group_runs[run.group.as_str()] > 1 {
                format!(
                    "{}_{}",
                    run.group,
                    run.material.as_deref().unwrap_or("default")
                )
            } else {
                run.group.clone()
            };

            let material = match run.material.as_deref() {
                Some(m) => {
                    let id = self.material(m);
                    if id.is_none() && missing.insert(m) {
                        self.warnings.warn(
                            Stage::Read,
                            Subject::asset(),
                            format!("material '{}' is not defined in any mtllib; using the default material", m),
                        );
                    }
                    id
                }
                None => None,
            };

            let attributes = self.run_attributes(run, &data, &name);
            let mesh = Mesh::new(name.clone(), attributes, material).map_err(|e| {
                ParseError::new(self.path, format!("mesh '{}': {}", name, e))
            })?;
            let mesh_id = self.scene.add_mesh(mesh);
            self.scene
                .add_node(None, SceneNode::new(name, Mat4::IDENTITY).with_mesh(mesh_id));
        }

        tracing::info!(
            "Read OBJ {:?}: {} meshes, {} materials, {} textures",
            self.path,
            self.scene.meshes.len(),
            self.scene.materials.len(),
            self.scene.textures.len()
        );
        Ok(self.scene)
    }

    /// Weld the run's corners into indexed vertex attributes
    fn run_attributes(&self, run: &Run, data: &ObjData, name: &str) -> MeshAttributes {
        let all_uv = run.corners.iter().all(|c| c.1.is_some());
        let any_uv = run.corners.iter().any(|c| c.1.is_some());
        let all_normals = run.corners.iter().all(|c| c.2.is_some());
        let any_normals = run.corners.iter().any(|c| c.2.is_some());
        let any_color = run
            .corners
            .iter()
            .any(|c| data.colors[c.0 as usize].is_some());

        let subject = Subject::mesh(self.scene.meshes.len(), name);
        if any_uv && !all_uv {
            self.warnings.warn(
                Stage::Read,
                subject.clone(),
                "some faces lack texture coordinates; UVs dropped for this mesh",
            );
        }
        if any_normals && !all_normals {
            self.warnings.warn(
                Stage::Read,
                subject,
                "some faces lack normals; normals dropped for this mesh",
            );
        }

        let mut welded: HashMap<Corner, u32> = HashMap::new();
        let mut positions = Vec::new();
        let mut uvs = Vec::new();
        let mut normals = Vec::new();
        let mut colors = Vec::new();
        let mut flat = Vec::with_capacity(run.corners.len());

        for corner in &run.corners {
            let key = (
                corner.0,
                corner.1.filter(|_| all_uv),
                corner.2.filter(|_| all_normals),
            );
            let index = *welded.entry(key).or_insert_with(|| {
                let (v, vt, vn) = key;
                positions.push(data.positions[v as usize]);
                if let Some(vt) = vt {
                    uvs.push(data.texcoords[vt as usize]);
                }
                if let Some(vn) = vn {
                    normals.push(data.normals[vn as usize]);
                }
                if any_color {
                    let [r, g, b] = data.colors[v as usize].unwrap_or([1.0; 3]);
                    colors.push([r, g, b, 1.0]);
                }
                (positions.len() - 1) as u32
            });
            flat.push(index);
        }

        MeshAttributes {
            positions,
            normals: all_normals.then_some(normals),
            uv_sets: if all_uv { vec![uvs] } else { Vec::new() },
            colors: any_color.then_some(colors),
            indices: flat.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect(),
        }
    }
}
