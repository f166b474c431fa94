//! Scene file emission
//!
//! Builds the Mitsuba 3 scene document from a normalized [`Scene`], its
//! mapped materials, and the written mesh files, then writes `scene.xml`.
//! Top-level elements appear in a fixed order: integrator, sensors,
//! emitters, BSDFs, shapes.

pub mod ids;
pub mod xml;

pub use ids::{SceneIds, DEFAULT_BSDF_ID};

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use glam::{Mat4, Vec3};
use mitsuba_common::layout::{SCENE_FILE, SCENE_VERSION};
use serde::Serialize;
use xmltree::Element;

use crate::context::{ConversionContext, ConvertOptions, HierarchyMode, UpAxis};
use crate::diagnostics::{Stage, Subject, SubjectKind, WarningSink};
use crate::error::ConversionError;
use crate::material::{units, Bsdf, ColorParam, FloatParam, MappedMaterial, SurfaceDetail};
use crate::scene::{Camera, Light, LightKind, Projection, Scene, TextureId};
use crate::serialize::MeshFileRef;
use xml::push;

/// The written scene file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneFileRef {
    pub path: PathBuf,
    pub sensors: usize,
    pub emitters: usize,
    pub bsdfs: usize,
    pub shapes: usize,
}

/// Everything the document builder reads
pub struct EmitInput<'a> {
    pub scene: &'a Scene,
    pub materials: &'a [MappedMaterial],
    /// Indexed by mesh id
    pub mesh_files: &'a [MeshFileRef],
    pub options: &'a ConvertOptions,
    pub warnings: &'a WarningSink,
}

/// Counts of emitted top-level elements
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmitCounts {
    pub sensors: usize,
    pub emitters: usize,
    pub bsdfs: usize,
    pub shapes: usize,
}

/// Build the scene document
pub fn build_document(input: &EmitInput<'_>) -> (Element, EmitCounts) {
    let scene = input.scene;
    let render = &input.options.render;
    let world = scene.world_transforms();
    let order = scene.depth_first();
    let ids = SceneIds::assign(scene, input.materials);
    let mut counts = EmitCounts::default();

    let mut root = Element::new("scene");
    root.attributes
        .insert("version".to_string(), SCENE_VERSION.to_string());

    let mut integrator = xml::plugin("integrator", "path");
    push(&mut integrator, xml::integer("max_depth", render.max_depth));
    push(&mut root, integrator);

    for &id in &order {
        if let Some(camera) = scene.node(id).camera {
            push(&mut root, sensor(&scene.cameras[camera.0], &world[id.0], input.options));
            counts.sensors += 1;
        }
    }
    if counts.sensors == 0 {
        push(&mut root, default_sensor(scene, input.options));
        counts.sensors = 1;
    }

    for &id in &order {
        if let Some(light) = scene.node(id).light {
            push(
                &mut root,
                emitter(&scene.lights[light.0], &world[id.0], input.options),
            );
            counts.emitters += 1;
        }
    }
    if counts.emitters == 0 {
        push(&mut root, xml::plugin("emitter", "constant"));
        counts.emitters = 1;
    }

    for (index, material) in input.materials.iter().enumerate() {
        let element = bsdf_element(material, input, index);
        push(&mut root, xml::with_id(element, &ids.materials[index]));
        counts.bsdfs += 1;
    }
    if let Some(default_id) = &ids.default_bsdf {
        let neutral = MappedMaterial::neutral(DEFAULT_BSDF_ID);
        let element = bsdf_element(&neutral, input, usize::MAX);
        push(&mut root, xml::with_id(element, default_id));
        counts.bsdfs += 1;
    }

    let shape_type = input.options.mesh_format.shape_type();
    for (node_id, shape_id) in &ids.shapes {
        let node = scene.node(*node_id);
        let Some(mesh_id) = node.mesh else { continue };
        let file = &input.mesh_files[mesh_id.0];

        let mut shape = xml::with_id(xml::plugin("shape", shape_type), shape_id);
        push(&mut shape, xml::string("filename", &file.path));

        let matrices = match input.options.hierarchy {
            HierarchyMode::Flatten => vec![world[node_id.0]],
            HierarchyMode::Nested => scene.transform_chain(*node_id),
        };
        let ops = matrices.iter().map(xml::matrix).collect();
        push(&mut shape, xml::transform("to_world", ops));

        if !file.has_normals {
            push(&mut shape, xml::boolean("face_normals", true));
        }

        let material = scene.effective_material(*node_id);
        let bsdf_id = match material {
            Some(m) => ids.materials[m.0].as_str(),
            None => ids.default_bsdf.as_deref().unwrap_or(DEFAULT_BSDF_ID),
        };
        push(&mut shape, xml::reference(bsdf_id));

        if let Some(emission) = material.and_then(|m| input.materials[m.0].emission) {
            let mut area = xml::plugin("emitter", "area");
            push(&mut area, color_element("radiance", emission, input, material.map_or(0, |m| m.0)));
            push(&mut shape, area);
        }

        push(&mut root, shape);
        counts.shapes += 1;
    }

    tracing::info!(
        "Built scene document: {} sensors, {} emitters, {} bsdfs, {} shapes",
        counts.sensors,
        counts.emitters,
        counts.bsdfs,
        counts.shapes
    );
    (root, counts)
}

/// Build and write `<output>/scene.xml`
pub fn emit_scene(
    ctx: &ConversionContext,
    input: &EmitInput<'_>,
) -> Result<SceneFileRef, ConversionError> {
    let (root, counts) = build_document(input);
    let path = ctx.output_dir().join(SCENE_FILE);
    let file = File::create(&path).map_err(|e| ConversionError::io(&path, e))?;
    xml::write_document(&root, BufWriter::new(file)).map_err(|e| ConversionError::io(&path, e))?;
    tracing::info!("Wrote {:?}", path);
    Ok(SceneFileRef {
        path,
        sensors: counts.sensors,
        emitters: counts.emitters,
        bsdfs: counts.bsdfs,
        shapes: counts.shapes,
    })
}

/// Any unit vector not parallel to `forward`, preferring `up`
fn safe_up(forward: Vec3, up: Vec3) -> Vec3 {
    if forward.cross(up).length_squared() > 1e-8 {
        return up;
    }
    [Vec3::Y, Vec3::Z, Vec3::X]
        .into_iter()
        .find(|axis| forward.cross(*axis).length_squared() > 1e-8)
        .unwrap_or(Vec3::Y)
}

/// `lookat` placing local `forward`/`up` of a node frame in world space
fn frame_lookat(world: &Mat4, forward: Vec3, up: Vec3) -> Element {
    let origin = world.transform_point3(Vec3::ZERO);
    let forward = world.transform_vector3(forward).normalize_or(Vec3::NEG_Z);
    let up = safe_up(forward, world.transform_vector3(up).normalize_or(Vec3::Y));
    xml::lookat(origin, origin + forward, up)
}

fn sampler_and_film(sensor: &mut Element, options: &ConvertOptions, width: u32) {
    let render = &options.render;
    let mut sampler = xml::plugin("sampler", "independent");
    push(&mut sampler, xml::integer("sample_count", render.sample_count));
    push(sensor, sampler);

    let mut film = xml::plugin("film", "hdrfilm");
    push(&mut film, xml::integer("width", width));
    push(&mut film, xml::integer("height", render.height));
    push(&mut film, xml::string("pixel_format", "rgb"));
    push(sensor, film);
}

fn sensor(camera: &Camera, world: &Mat4, options: &ConvertOptions) -> Element {
    let render = &options.render;
    let lookat = frame_lookat(world, camera.forward, camera.up);
    match camera.projection {
        Projection::Perspective {
            yfov,
            aspect_ratio,
            znear,
            zfar,
        } => {
            let mut e = xml::plugin("sensor", "perspective");
            push(&mut e, xml::float("fov", yfov.to_degrees()));
            push(&mut e, xml::string("fov_axis", "y"));
            push(&mut e, xml::float("near_clip", znear));
            if let Some(zfar) = zfar {
                push(&mut e, xml::float("far_clip", zfar));
            }
            push(&mut e, xml::transform("to_world", vec![lookat]));
            let width = aspect_ratio
                .filter(|a| *a > 0.0)
                .map(|a| ((render.height as f32) * a).round().max(1.0) as u32)
                .unwrap_or(render.width);
            sampler_and_film(&mut e, options, width);
            e
        }
        Projection::Orthographic {
            xmag,
            ymag,
            znear,
            zfar,
        } => {
            let mut e = xml::plugin("sensor", "orthographic");
            push(&mut e, xml::float("near_clip", znear));
            push(&mut e, xml::float("far_clip", zfar));
            push(
                &mut e,
                xml::transform("to_world", vec![xml::scale(Vec3::new(xmag, ymag, 1.0)), lookat]),
            );
            let width = if ymag > 0.0 {
                ((render.height as f32) * xmag / ymag).round().max(1.0) as u32
            } else {
                render.width
            };
            sampler_and_film(&mut e, options, width);
            e
        }
    }
}

/// Perspective sensor framing the scene bounds from the front and above
fn default_sensor(scene: &Scene, options: &ConvertOptions) -> Element {
    let render = &options.render;
    let (center, radius) = match scene.world_bounds() {
        Some(bounds) => (bounds.center(), (bounds.extent().length() * 0.5).max(1e-3)),
        None => (Vec3::ZERO, 1.0),
    };
    let (direction, up) = match scene.convention.up {
        UpAxis::Y => (Vec3::new(0.0, 0.35, 1.0), Vec3::Y),
        UpAxis::Z => (Vec3::new(0.0, -1.0, 0.35), Vec3::Z),
    };
    let half_fov = (render.fov * 0.5).to_radians();
    let distance = radius / half_fov.sin() * 1.1;
    let origin = center + direction.normalize() * distance;

    let mut e = xml::plugin("sensor", "perspective");
    push(&mut e, xml::float("fov", render.fov));
    push(&mut e, xml::string("fov_axis", "y"));
    push(&mut e, xml::float("near_clip", distance * 0.001));
    push(&mut e, xml::float("far_clip", (distance + radius) * 10.0));
    push(
        &mut e,
        xml::transform("to_world", vec![xml::lookat(origin, center, up)]),
    );
    sampler_and_film(&mut e, options, render.width);
    e
}

fn emitter(light: &Light, world: &Mat4, options: &ConvertOptions) -> Element {
    let radiometric = units::photometric_to_radiometric(light.intensity, options.light_intensity_scale);
    let power = light.color.map(|c| c * radiometric);
    match light.kind {
        LightKind::Point => {
            let mut e = xml::plugin("emitter", "point");
            push(&mut e, xml::point("position", world.transform_point3(Vec3::ZERO)));
            push(&mut e, xml::rgb("intensity", power));
            e
        }
        LightKind::Spot {
            inner_cone,
            outer_cone,
        } => {
            let mut e = xml::plugin("emitter", "spot");
            push(
                &mut e,
                xml::transform("to_world", vec![frame_lookat(world, light.forward, light.up)]),
            );
            push(&mut e, xml::rgb("intensity", power));
            push(&mut e, xml::float("cutoff_angle", outer_cone.to_degrees()));
            push(&mut e, xml::float("beam_width", inner_cone.min(outer_cone).to_degrees()));
            e
        }
        LightKind::Directional => {
            let mut e = xml::plugin("emitter", "directional");
            let direction = world.transform_vector3(light.forward).normalize_or(Vec3::NEG_Z);
            push(&mut e, xml::vector("direction", direction));
            push(&mut e, xml::rgb("irradiance", power));
            e
        }
    }
}

/// Scene-relative file of a texture; `None` (with a warning) if it has none
fn texture_file<'a>(input: &EmitInput<'a>, id: TextureId, material: usize) -> Option<(&'a str, bool)> {
    let texture = input.scene.textures.get(id.0)?;
    match texture.output.as_deref() {
        Some(path) => Some((path, texture.is_raw())),
        None => {
            input.warnings.warn(
                Stage::Emit,
                Subject::new(SubjectKind::Material, material, ""),
                format!("texture '{}' has no output path; using a constant", texture.name),
            );
            None
        }
    }
}

fn color_element(name: &str, param: ColorParam, input: &EmitInput<'_>, material: usize) -> Element {
    match param {
        ColorParam::Rgb(v) => xml::rgb(name, v),
        ColorParam::Texture(id) => match texture_file(input, id, material) {
            Some((path, raw)) => xml::bitmap(name, path, raw),
            None => xml::rgb(name, crate::material::DEFAULT_GRAY),
        },
    }
}

fn float_element(name: &str, param: FloatParam, input: &EmitInput<'_>, material: usize) -> Element {
    match param {
        FloatParam::Value(v) => xml::float(name, v),
        FloatParam::Texture(id) => match texture_file(input, id, material) {
            Some((path, _)) => xml::bitmap(name, path, true),
            None => xml::float(name, 0.5),
        },
    }
}

fn base_bsdf(bsdf: &Bsdf, input: &EmitInput<'_>, material: usize) -> Element {
    let mut e = xml::plugin("bsdf", bsdf.plugin());
    match *bsdf {
        Bsdf::Principled {
            base_color,
            metallic,
            roughness,
            eta,
            spec_trans,
        } => {
            push(&mut e, color_element("base_color", base_color, input, material));
            push(&mut e, float_element("metallic", metallic, input, material));
            push(&mut e, float_element("roughness", roughness, input, material));
            if let Some(eta) = eta {
                push(&mut e, xml::float("eta", eta));
            }
            if spec_trans > 0.0 {
                push(&mut e, xml::float("spec_trans", spec_trans));
            }
        }
        Bsdf::RoughPlastic {
            diffuse_reflectance,
            specular_reflectance,
            alpha,
            int_ior,
        } => {
            push(&mut e, xml::string("distribution", "beckmann"));
            push(&mut e, xml::float("alpha", alpha));
            push(&mut e, xml::float("int_ior", int_ior));
            push(
                &mut e,
                color_element("diffuse_reflectance", diffuse_reflectance, input, material),
            );
            if let Some(specular) = specular_reflectance {
                push(
                    &mut e,
                    color_element("specular_reflectance", specular, input, material),
                );
            }
        }
        Bsdf::Diffuse { reflectance } => {
            push(&mut e, color_element("reflectance", reflectance, input, material));
        }
    }
    e
}

/// Base BSDF wrapped as `mask(twosided(normalmap|bumpmap(base)))`
fn bsdf_element(material: &MappedMaterial, input: &EmitInput<'_>, index: usize) -> Element {
    let mut e = base_bsdf(&material.bsdf, input, index);

    if let Some(detail) = material.detail {
        let (plugin, texture, name, scale) = match detail {
            SurfaceDetail::NormalMap(texture) => ("normalmap", texture, "normalmap", None),
            SurfaceDetail::BumpMap { texture, scale } => ("bumpmap", texture, "arbitrary", Some(scale)),
        };
        if let Some((path, _)) = texture_file(input, texture, index) {
            let mut wrapper = xml::plugin("bsdf", plugin);
            push(&mut wrapper, xml::bitmap(name, path, true));
            if let Some(scale) = scale {
                push(&mut wrapper, xml::float("scale", scale));
            }
            push(&mut wrapper, e);
            e = wrapper;
        }
    }

    if material.two_sided {
        let mut wrapper = xml::plugin("bsdf", "twosided");
        push(&mut wrapper, e);
        e = wrapper;
    }

    if let Some(opacity) = material.opacity {
        let mut wrapper = xml::plugin("bsdf", "mask");
        push(&mut wrapper, float_element("opacity", opacity, input, index));
        push(&mut wrapper, e);
        e = wrapper;
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics;
    use crate::material::MappingRule;
    use crate::scene::{
        ColorSpace, Convention, MaterialId, Mesh, MeshAttributes, MeshId, SceneNode, SourceFormat,
        TextureRef, TextureSource, TextureUsage, UvOrigin,
    };
    use std::path::Path;

    fn render(input: &EmitInput<'_>) -> String {
        let (root, _) = build_document(input);
        let mut out = Vec::new();
        xml::write_document(&root, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn instanced_scene() -> (Scene, Vec<MeshFileRef>) {
        let mut scene = Scene::new("s", "s.gltf", SourceFormat::Gltf, Convention::Y_UP_RIGHT, UvOrigin::TopLeft);
        let attributes = MeshAttributes {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            indices: vec![[0, 1, 2]],
            ..Default::default()
        };
        let mesh = scene.add_mesh(Mesh::new("tri", attributes, Some(MaterialId(0))).unwrap());
        for x in [0.0, 2.0] {
            scene.add_node(
                None,
                SceneNode::new("tri", Mat4::from_translation(Vec3::new(x, 0.0, 0.0))).with_mesh(mesh),
            );
        }
        let files = vec![MeshFileRef {
            mesh: MeshId(0),
            path: "meshes/tri.serialized".to_string(),
            vertex_count: 3,
            triangle_count: 1,
            has_normals: false,
            bytes: 0,
        }];
        (scene, files)
    }

    #[test]
    fn test_instanced_mesh_referenced_twice() {
        let (scene, files) = instanced_scene();
        let (sink, _c) = diagnostics::channel(Path::new("s.gltf"));
        let materials = vec![MappedMaterial::neutral("gray")];
        let options = ConvertOptions::default();
        let input = EmitInput {
            scene: &scene,
            materials: &materials,
            mesh_files: &files,
            options: &options,
            warnings: &sink,
        };
        let (_, counts) = build_document(&input);
        assert_eq!(counts.shapes, 2);
        assert_eq!(counts.bsdfs, 1);

        let xml = render(&input);
        assert_eq!(xml.matches(r#"value="meshes/tri.serialized""#).count(), 2);
        assert_eq!(xml.matches(r#"<ref id="gray""#).count(), 2);
        assert!(xml.contains(r#"id="tri_1""#));
        assert!(xml.contains(r#"<boolean name="face_normals" value="true""#));
        assert!(xml.contains(r#"<emitter type="constant""#));
        assert!(xml.contains(r#"<integer name="sample_count" value="32""#));

        // integrator, sensor, emitter, bsdf, shapes
        let positions: Vec<usize> = ["<integrator", "<sensor", "<emitter", "<bsdf", "<shape"]
            .iter()
            .map(|tag| xml.find(tag).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_wrapped_bsdf_nesting() {
        let (mut scene, files) = instanced_scene();
        scene.textures.push(TextureRef {
            output: Some("textures/normal.png".to_string()),
            ..TextureRef::new(
                "normal",
                TextureSource::File("/n.png".into()),
                ColorSpace::Linear,
                TextureUsage::Normal,
            )
        });
        let (sink, _c) = diagnostics::channel(Path::new("s.gltf"));
        let materials = vec![MappedMaterial {
            name: "leaf".to_string(),
            rule: MappingRule::Diffuse,
            bsdf: Bsdf::Diffuse {
                reflectance: ColorParam::Rgb([0.1, 0.5, 0.1]),
            },
            detail: Some(SurfaceDetail::NormalMap(TextureId(0))),
            two_sided: true,
            opacity: Some(FloatParam::Value(0.5)),
            emission: Some(ColorParam::Rgb([1.0, 1.0, 1.0])),
        }];
        let options = ConvertOptions::default();
        let input = EmitInput {
            scene: &scene,
            materials: &materials,
            mesh_files: &files,
            options: &options,
            warnings: &sink,
        };
        let xml = render(&input);
        let order: Vec<usize> = [
            r#"<bsdf type="mask" id="leaf""#,
            r#"<float name="opacity""#,
            r#"<bsdf type="twosided""#,
            r#"<bsdf type="normalmap""#,
            r#"value="textures/normal.png""#,
            r#"<bsdf type="diffuse""#,
        ]
        .iter()
        .map(|s| xml.find(s).unwrap())
        .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(xml.matches(r#"<emitter type="area""#).count(), 2);
    }

    #[test]
    fn test_nested_mode_writes_chain() {
        let mut scene = Scene::new("s", "s.gltf", SourceFormat::Gltf, Convention::Y_UP_RIGHT, UvOrigin::TopLeft);
        let attributes = MeshAttributes {
            positions: vec![[0.0; 3]; 3],
            indices: vec![[0, 1, 2]],
            ..Default::default()
        };
        let mesh = scene.add_mesh(Mesh::new("m", attributes, None).unwrap());
        let parent = scene.add_node(None, SceneNode::new("p", Mat4::from_translation(Vec3::X)));
        scene.add_node(Some(parent), SceneNode::new("c", Mat4::IDENTITY).with_mesh(mesh));
        let files = vec![MeshFileRef {
            mesh: MeshId(0),
            path: "meshes/m.serialized".to_string(),
            vertex_count: 3,
            triangle_count: 1,
            has_normals: true,
            bytes: 0,
        }];
        let (sink, _c) = diagnostics::channel(Path::new("s.gltf"));
        let options = ConvertOptions {
            hierarchy: HierarchyMode::Nested,
            ..Default::default()
        };
        let input = EmitInput {
            scene: &scene,
            materials: &[],
            mesh_files: &files,
            options: &options,
            warnings: &sink,
        };
        let xml = render(&input);
        assert_eq!(xml.matches("<matrix").count(), 2);
        assert!(xml.contains(r#"<ref id="default_bsdf""#));
        assert!(!xml.contains("face_normals"));
    }
}
