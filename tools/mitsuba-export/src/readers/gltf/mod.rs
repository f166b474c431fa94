//! glTF 2.0 / GLB reader
//!
//! The container is validated first ([`container`]), then the document is
//! parsed and validated by the `gltf` crate, buffers are loaded, and every
//! accessor is bounds-checked against its buffer view before any geometry
//! is decoded. Extension payloads (lights, material extensions, texture
//! transforms) are read from the raw JSON.
//!
//! Conventions: glTF is Y-up, right-handed, UV origin top-left.

mod container;
mod material;
mod mesh;

pub use container::{validate_glb, GlbLayout, CHUNK_BIN, CHUNK_JSON, GLB_MAGIC, GLB_VERSION};

use std::path::Path;

use glam::Mat4;
use hashbrown::{HashMap, HashSet};
use serde_json::Value;

use super::{read_bytes, stem_or, FormatReader};
use crate::context::ConversionContext;
use crate::diagnostics::{Stage, Subject, SubjectKind, WarningSink};
use crate::error::{ConversionError, ParseError};
use crate::scene::{
    Camera, CameraId, Convention, Light, LightId, LightKind, MaterialId, MeshId, NodeId,
    Projection, Scene, SceneNode, SourceFormat, TextureId, TextureSource, UvOrigin,
};

/// Extensions that may appear in `extensionsRequired`
const REQUIRED_OK: &[&str] = &[
    "KHR_lights_punctual",
    "KHR_materials_emissive_strength",
    "KHR_materials_ior",
    "KHR_materials_pbrSpecularGlossiness",
    "KHR_materials_transmission",
    "KHR_texture_transform",
];

pub struct GltfReader;

impl FormatReader for GltfReader {
    fn read(
        &self,
        path: &Path,
        _ctx: &ConversionContext,
        warnings: &WarningSink,
    ) -> Result<Scene, ConversionError> {
        let bytes = read_bytes(path)?;
        Ok(read_gltf(path, &bytes, warnings)?)
    }
}

/// Parse a `.gltf` or `.glb` image whose external references resolve next to `path`
pub fn read_gltf(path: &Path, bytes: &[u8], warnings: &WarningSink) -> Result<Scene, ParseError> {
    let raw: Value = if bytes.starts_with(GLB_MAGIC) {
        let layout = validate_glb(path, bytes)?;
        let json_start = layout.json.start as u64;
        serde_json::from_slice(&bytes[layout.json]).map_err(|e| {
            ParseError::new(path, format!("invalid JSON chunk: {}", e)).at_offset(json_start)
        })?
    } else {
        serde_json::from_slice(bytes).map_err(|e| {
            ParseError::new(path, format!("invalid JSON: {}", e)).at_line(e.line())
        })?
    };
    check_required_extensions(path, &raw)?;

    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes)
        .map_err(|e| ParseError::new(path, format!("invalid glTF document: {}", e)))?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob)
        .map_err(|e| ParseError::new(path, format!("failed to load buffers: {}", e)))?;
    mesh::check_buffer_bounds(path, &document, &buffers)?;

    let builder = SceneBuilder {
        path,
        document: &document,
        buffers: &buffers,
        raw: &raw,
        warnings,
        scene: Scene::new(
            stem_or(path, "scene"),
            path,
            SourceFormat::Gltf,
            Convention::Y_UP_RIGHT,
            UvOrigin::TopLeft,
        ),
        visited: HashSet::new(),
        meshes: HashMap::new(),
        materials: HashMap::new(),
        textures: HashMap::new(),
        images: HashMap::new(),
        cameras: HashMap::new(),
        lights: HashMap::new(),
    };
    builder.build()
}

fn check_required_extensions(path: &Path, raw: &Value) -> Result<(), ParseError> {
    let Some(required) = raw["extensionsRequired"].as_array() else {
        return Ok(());
    };
    for ext in required.iter().filter_map(Value::as_str) {
        if !REQUIRED_OK.contains(&ext) {
            return Err(ParseError::new(
                path,
                format!("asset requires unsupported extension '{}'", ext),
            ));
        }
    }
    Ok(())
}

pub(super) fn f32_field(value: &Value, key: &str) -> Option<f32> {
    value[key].as_f64().map(|v| v as f32)
}

pub(super) fn vec_field<const N: usize>(value: &Value, key: &str) -> Option<[f32; N]> {
    let array = value[key].as_array()?;
    if array.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, v) in out.iter_mut().zip(array) {
        *slot = v.as_f64()? as f32;
    }
    Some(out)
}

type TextureKey = (usize, crate::scene::Channel, crate::scene::TextureUsage);

/// Walks one glTF document into a [`Scene`]
struct SceneBuilder<'a> {
    path: &'a Path,
    document: &'a gltf::Document,
    buffers: &'a [gltf::buffer::Data],
    raw: &'a Value,
    warnings: &'a WarningSink,
    scene: Scene,
    visited: HashSet<usize>,
    /// (mesh, primitive) -> ISG mesh, `None` for dropped primitives
    meshes: HashMap<(usize, usize), Option<MeshId>>,
    materials: HashMap<usize, MaterialId>,
    textures: HashMap<TextureKey, TextureId>,
    images: HashMap<usize, TextureSource>,
    cameras: HashMap<usize, CameraId>,
    lights: HashMap<usize, LightId>,
}

impl SceneBuilder<'_> {
    fn build(mut self) -> Result<Scene, ParseError> {
        let document = self.document;
        let skins = document.skins().count();
        if skins > 0 {
            self.warnings.dropped(
                Stage::Read,
                Subject::asset(),
                "skins",
                format!("{} skin(s) dropped; skinned meshes are exported unposed", skins),
            );
        }
        let animations = document.animations().count();
        if animations > 0 {
            self.warnings.dropped(
                Stage::Read,
                Subject::asset(),
                "animations",
                format!("{} animation(s) dropped; the scene is exported at rest", animations),
            );
        }

        let roots: Vec<gltf::Node> = match document
            .default_scene()
            .or_else(|| document.scenes().next())
        {
            Some(scene) => scene.nodes().collect(),
            None => {
                // No scene: every node without a parent is a root.
                let children: HashSet<usize> = document
                    .nodes()
                    .flat_map(|n| n.children().map(|c| c.index()))
                    .collect();
                document
                    .nodes()
                    .filter(|n| !children.contains(&n.index()))
                    .collect()
            }
        };

        for node in roots {
            self.add_node(node, None)?;
        }

        tracing::info!(
            "Read glTF {:?}: {} nodes, {} meshes, {} materials, {} textures",
            self.path,
            self.scene.nodes().len(),
            self.scene.meshes.len(),
            self.scene.materials.len(),
            self.scene.textures.len()
        );
        Ok(self.scene)
    }

    fn add_node(&mut self, node: gltf::Node<'_>, parent: Option<NodeId>) -> Result<(), ParseError> {
        if !self.visited.insert(node.index()) {
            return Err(ParseError::new(
                self.path,
                format!("node {} appears more than once in the hierarchy", node.index()),
            ));
        }

        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node{}", node.index()));
        let transform = Mat4::from_cols_array_2d(&node.transform().matrix());
        let mut isg_node = SceneNode::new(name.clone(), transform);

        if let Some(camera) = node.camera() {
            isg_node.camera = Some(self.camera(&camera));
        }
        isg_node.light = self.node_light(node.index())?;

        let id = self.scene.add_node(parent, isg_node);

        if let Some(mesh) = node.mesh() {
            let primitives = self.mesh_primitives(&mesh)?;
            match primitives.as_slice() {
                [] => {}
                [single] => self.scene.node_mut(id).mesh = Some(*single),
                many => {
                    for (i, mesh_id) in many.iter().enumerate() {
                        let child =
                            SceneNode::new(format!("{}_{}", name, i), Mat4::IDENTITY).with_mesh(*mesh_id);
                        self.scene.add_node(Some(id), child);
                    }
                }
            }
        }

        for child in node.children() {
            self.add_node(child, Some(id))?;
        }
        Ok(())
    }

    /// ISG meshes for the usable primitives of a glTF mesh, created once per primitive
    fn mesh_primitives(&mut self, mesh: &gltf::Mesh<'_>) -> Result<Vec<MeshId>, ParseError> {
        let base_name = mesh
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("mesh{}", mesh.index()));
        let primitive_count = mesh.primitives().count();
        let mut ids = Vec::with_capacity(primitive_count);

        for primitive in mesh.primitives() {
            let key = (mesh.index(), primitive.index());
            if let Some(cached) = self.meshes.get(&key) {
                ids.extend(*cached);
                continue;
            }

            let name = if primitive_count == 1 {
                base_name.clone()
            } else {
                format!("{}_{}", base_name, primitive.index())
            };
            let subject = Subject::mesh(mesh.index(), name.clone());

            if primitive.morph_targets().next().is_some() {
                self.warnings.dropped(
                    Stage::Read,
                    subject.clone(),
                    "morph targets",
                    "morph targets dropped; base shape exported",
                );
            }

            let attributes =
                mesh::read_primitive(self.path, &name, &primitive, self.buffers, self.warnings, &subject)?;
            let id = match attributes {
                Some(attributes) => {
                    let material = match primitive.material().index() {
                        Some(index) => Some(self.material(index)?),
                        None => None,
                    };
                    let isg_mesh = crate::scene::Mesh::new(name.clone(), attributes, material)
                        .map_err(|e| {
                            ParseError::new(self.path, format!("mesh '{}': {}", name, e))
                        })?;
                    Some(self.scene.add_mesh(isg_mesh))
                }
                None => None,
            };
            self.meshes.insert(key, id);
            ids.extend(id);
        }
        Ok(ids)
    }

    fn camera(&mut self, camera: &gltf::Camera<'_>) -> CameraId {
        if let Some(&id) = self.cameras.get(&camera.index()) {
            return id;
        }
        let projection = match camera.projection() {
            gltf::camera::Projection::Perspective(p) => Projection::Perspective {
                yfov: p.yfov(),
                aspect_ratio: p.aspect_ratio(),
                znear: p.znear(),
                zfar: p.zfar(),
            },
            gltf::camera::Projection::Orthographic(o) => Projection::Orthographic {
                xmag: o.xmag(),
                ymag: o.ymag(),
                znear: o.znear(),
                zfar: o.zfar(),
            },
        };
        let name = camera
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("camera{}", camera.index()));
        let id = self.scene.add_camera(Camera::new(name, projection));
        self.cameras.insert(camera.index(), id);
        id
    }

    /// `KHR_lights_punctual` light attached to a node, if any
    fn node_light(&mut self, node_index: usize) -> Result<Option<LightId>, ParseError> {
        let Some(light_index) =
            self.raw["nodes"][node_index]["extensions"]["KHR_lights_punctual"]["light"].as_u64()
        else {
            return Ok(None);
        };
        let light_index = light_index as usize;
        if let Some(&id) = self.lights.get(&light_index) {
            return Ok(Some(id));
        }

        let def = &self.raw["extensions"]["KHR_lights_punctual"]["lights"][light_index];
        if !def.is_object() {
            return Err(ParseError::new(
                self.path,
                format!("node {} references missing light {}", node_index, light_index),
            ));
        }

        let name = def["name"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("light{}", light_index));
        let kind = match def["type"].as_str() {
            Some("point") => LightKind::Point,
            Some("directional") => LightKind::Directional,
            Some("spot") => LightKind::Spot {
                inner_cone: f32_field(&def["spot"], "innerConeAngle").unwrap_or(0.0),
                outer_cone: f32_field(&def["spot"], "outerConeAngle")
                    .unwrap_or(std::f32::consts::FRAC_PI_4),
            },
            other => {
                self.warnings.warn(
                    Stage::Read,
                    Subject::new(SubjectKind::Light, light_index, name),
                    format!("unknown light type {:?}, light dropped", other),
                );
                return Ok(None);
            }
        };

        let color = vec_field::<3>(def, "color").unwrap_or([1.0; 3]);
        let intensity = f32_field(def, "intensity").unwrap_or(1.0);
        let mut light = Light::new(name, kind, color, intensity);
        light.range = f32_field(def, "range");

        let id = self.scene.add_light(light);
        self.lights.insert(light_index, id);
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_extension_rejected() {
        let raw: Value =
            serde_json::from_str(r#"{"extensionsRequired":["KHR_draco_mesh_compression"]}"#).unwrap();
        let err = check_required_extensions(Path::new("a.gltf"), &raw).unwrap_err();
        assert!(err.reason.contains("KHR_draco_mesh_compression"));
    }

    #[test]
    fn test_required_extension_accepted() {
        let raw: Value =
            serde_json::from_str(r#"{"extensionsRequired":["KHR_lights_punctual"]}"#).unwrap();
        assert!(check_required_extensions(Path::new("a.gltf"), &raw).is_ok());
    }

    #[test]
    fn test_vec_field() {
        let raw: Value = serde_json::from_str(r#"{"color":[1, 0.5, 0], "bad":[1, 2]}"#).unwrap();
        assert_eq!(vec_field::<3>(&raw, "color"), Some([1.0, 0.5, 0.0]));
        assert_eq!(vec_field::<3>(&raw, "bad"), None);
        assert_eq!(vec_field::<3>(&raw, "missing"), None);
    }
}
