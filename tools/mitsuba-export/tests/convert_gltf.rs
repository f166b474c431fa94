//! Integration tests for glTF/GLB conversion.
//!
//! Tests the complete flow:
//! 1. Generate a glTF or GLB programmatically
//! 2. Convert it into a scene directory
//! 3. Check the scene file, mesh files and report

mod gltf_generator;

use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::tempdir;

use gltf_generator::{pbr_material, png_bytes, quad, triangle, GltfBuilder, Primitive};
use mitsuba_export::{
    convert, convert_with_options, decode_mesh, normalize, read, ConversionContext,
    ConversionError, ConvertOptions, HierarchyMode, MeshFormat,
};

/// Scenario A: one red dielectric triangle under an identity node
fn red_triangle() -> GltfBuilder {
    let mut builder = GltfBuilder::new();
    let material = builder.add_material(pbr_material("Red", [1.0, 0.0, 0.0, 1.0], 0.0, 0.5));
    let mesh = builder.add_mesh(
        "Triangle",
        &[Primitive {
            material: Some(material),
            ..triangle()
        }],
    );
    let node = builder.add_node(json!({ "name": "Triangle", "mesh": mesh }));
    builder.add_root(node);
    builder
}

fn write_input(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write input");
    path
}

fn read_scene(out: &Path) -> String {
    std::fs::read_to_string(out.join("scene.xml")).expect("Failed to read scene.xml")
}

fn mesh_files(out: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(out.join("meshes"))
        .expect("Failed to list meshes")
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
}

#[test]
fn test_scenario_a_single_triangle() {
    let dir = tempdir().expect("Failed to create temp dir");
    let input = write_input(dir.path(), "triangle.glb", &red_triangle().to_glb());
    let out = dir.path().join("out");

    let report = convert(&input, &out).expect("Conversion failed");
    assert!(report.success);
    assert!(report.warnings.is_empty(), "unexpected warnings: {:?}", report.warnings);

    let files = mesh_files(&out);
    assert_eq!(files.len(), 1);
    let mesh = decode_mesh(&std::fs::read(&files[0]).unwrap()).expect("Failed to decode mesh");
    assert_eq!(mesh.vertex_count(), 3);
    assert_eq!(mesh.triangle_count(), 1);

    let xml = read_scene(&out);
    assert_eq!(xml.matches("<shape ").count(), 1);
    assert!(xml.contains(r#"value="meshes/triangle.serialized""#));
    assert_eq!(xml.matches(r#"<bsdf type="principled""#).count(), 1);
    assert!(xml.contains(r#"<rgb name="base_color" value="1, 0, 0""#));
    assert!(xml.contains(r#"<float name="roughness" value="0.5""#));
    assert!(xml.contains(r#"<ref id="red""#));
}

#[test]
fn test_scenario_c_clearcoat_dropped_once() {
    let mut builder = GltfBuilder::new();
    builder.use_extension("KHR_materials_clearcoat");
    let mut material = pbr_material("Coat", [0.8, 0.8, 0.8, 1.0], 0.0, 0.3);
    material["extensions"] = json!({
        "KHR_materials_clearcoat": { "clearcoatFactor": 1.0, "clearcoatRoughnessFactor": 0.1 }
    });
    let material = builder.add_material(material);
    let mesh = builder.add_mesh(
        "Body",
        &[Primitive {
            material: Some(material),
            ..quad()
        }],
    );
    let node = builder.add_node(json!({ "name": "Body", "mesh": mesh }));
    builder.add_root(node);

    let dir = tempdir().expect("Failed to create temp dir");
    let input = write_input(dir.path(), "coat.gltf", builder.to_gltf().as_bytes());
    let out = dir.path().join("out");

    let report = convert(&input, &out).expect("Conversion failed");
    assert!(report.success);
    assert_eq!(report.warnings.len(), 1, "warnings: {:?}", report.warnings);
    let warning = &report.warnings[0];
    assert_eq!(warning.subject.name, "Coat");
    assert_eq!(warning.feature.as_deref(), Some("KHR_materials_clearcoat"));
    assert!(warning.to_string().contains("Coat"));

    let xml = read_scene(&out);
    assert!(xml.contains(r#"<bsdf type="principled" id="coat""#));
}

#[test]
fn test_truncated_glb_writes_nothing() {
    let mut glb = red_triangle().to_glb();
    glb.truncate(glb.len() - 16);

    let dir = tempdir().expect("Failed to create temp dir");
    let input = write_input(dir.path(), "broken.glb", &glb);
    let out = dir.path().join("out");

    let err = convert(&input, &out).unwrap_err();
    assert!(matches!(err, ConversionError::Parse(_)), "got {:?}", err);
    assert!(!out.exists(), "output directory must not be created");
}

#[test]
fn test_instanced_mesh_written_once() {
    let mut builder = GltfBuilder::new();
    let mesh = builder.add_mesh("Shared", &[quad()]);
    for x in [0.0, 2.0, 4.0] {
        let node = builder.add_node(json!({ "name": "Tile", "mesh": mesh, "translation": [x, 0.0, 0.0] }));
        builder.add_root(node);
    }

    let dir = tempdir().expect("Failed to create temp dir");
    let input = write_input(dir.path(), "tiles.glb", &builder.to_glb());
    let out = dir.path().join("out");
    let report = convert(&input, &out).expect("Conversion failed");

    assert_eq!(mesh_files(&out).len(), 1);
    let mesh = report
        .assets
        .iter()
        .find(|a| a.output.as_deref() == Some("meshes/shared.serialized"))
        .expect("mesh asset missing from report");
    assert_eq!(mesh.instances, Some(3));
    let xml = read_scene(&out);
    assert_eq!(xml.matches(r#"value="meshes/shared.serialized""#).count(), 3);
    for id in ["tile", "tile_1", "tile_2"] {
        assert!(xml.contains(&format!(r#"id="{}""#, id)), "missing shape id {}", id);
    }
    assert_eq!(xml.matches(r#"<ref id="default_bsdf""#).count(), 3);
}

#[test]
fn test_identical_materials_merged() {
    let mut builder = GltfBuilder::new();
    let a = builder.add_material(pbr_material("Paint", [0.2, 0.4, 0.6, 1.0], 0.0, 0.7));
    let b = builder.add_material(pbr_material("PaintCopy", [0.2, 0.4, 0.6, 1.0], 0.0, 0.7));
    let first = builder.add_mesh("A", &[Primitive { material: Some(a), ..triangle() }]);
    let second = builder.add_mesh("B", &[Primitive { material: Some(b), ..quad() }]);
    for mesh in [first, second] {
        let node = builder.add_node(json!({ "mesh": mesh }));
        builder.add_root(node);
    }

    let dir = tempdir().expect("Failed to create temp dir");
    let input = write_input(dir.path(), "paint.glb", &builder.to_glb());
    let out = dir.path().join("out");
    let report = convert(&input, &out).expect("Conversion failed");

    assert_eq!(report.normalize.as_ref().unwrap().materials_merged, 1);
    let xml = read_scene(&out);
    assert_eq!(xml.matches("<bsdf type=\"principled\"").count(), 1);
    assert_eq!(xml.matches(r#"<ref id="paint""#).count(), 2);
}

#[test]
fn test_conversion_is_deterministic() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut builder = red_triangle();
    let mesh = builder.add_mesh("Panel", &[quad()]);
    let node = builder.add_node(json!({ "name": "Panel", "mesh": mesh, "scale": [2.0, 2.0, 2.0] }));
    builder.add_root(node);
    let input = write_input(dir.path(), "scene.glb", &builder.to_glb());

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    convert(&input, &first).expect("First conversion failed");
    convert(&input, &second).expect("Second conversion failed");

    assert_eq!(read_scene(&first), read_scene(&second));
    let a = mesh_files(&first);
    let b = mesh_files(&second);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.file_name(), y.file_name());
        assert_eq!(std::fs::read(x).unwrap(), std::fs::read(y).unwrap());
    }
}

/// Every file under `out` as (relative path, bytes), sorted by path
fn output_tree(out: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files = Vec::new();
    let mut pending = vec![out.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).expect("Failed to list output") {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let bytes = std::fs::read(&path).unwrap();
                files.push((path.strip_prefix(out).unwrap().to_path_buf(), bytes));
            }
        }
    }
    files.sort();
    files
}

#[test]
fn test_concurrent_conversions_match_sequential() {
    let dir = tempdir().expect("Failed to create temp dir");

    let mut tiles = GltfBuilder::new();
    let shared = tiles.add_mesh("Shared", &[quad()]);
    for x in [0.0, 2.0] {
        let node = tiles.add_node(json!({ "name": "Tile", "mesh": shared, "translation": [x, 0.0, 0.0] }));
        tiles.add_root(node);
    }

    let mut textured = GltfBuilder::new();
    let texture = textured.add_texture(&png_bytes(2, 2, [200, 40, 40, 255]), "image/png");
    let mut material = pbr_material("Brick", [1.0, 1.0, 1.0, 1.0], 0.0, 0.8);
    material["pbrMetallicRoughness"]["baseColorTexture"] = json!({ "index": texture });
    let material = textured.add_material(material);
    let wall = textured.add_mesh("Wall", &[Primitive { material: Some(material), ..quad() }]);
    let node = textured.add_node(json!({ "name": "Wall", "mesh": wall }));
    textured.add_root(node);

    let inputs = [
        write_input(dir.path(), "triangle.glb", &red_triangle().to_glb()),
        write_input(dir.path(), "tiles.glb", &tiles.to_glb()),
        write_input(dir.path(), "wall.gltf", textured.to_gltf().as_bytes()),
    ];

    let sequential: Vec<_> = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let out = dir.path().join(format!("seq_{}", i));
            convert(input, &out).expect("Sequential conversion failed");
            output_tree(&out)
        })
        .collect();

    let outputs: Vec<PathBuf> = (0..inputs.len())
        .map(|i| dir.path().join(format!("par_{}", i)))
        .collect();
    std::thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .iter()
            .zip(&outputs)
            .map(|(input, out)| scope.spawn(move || convert(input, out)))
            .collect();
        for handle in handles {
            handle
                .join()
                .expect("Conversion thread panicked")
                .expect("Concurrent conversion failed");
        }
    });

    for (reference, out) in sequential.iter().zip(&outputs) {
        assert_eq!(&output_tree(out), reference, "{:?} differs", out);
    }
}

#[test]
fn test_normalize_is_idempotent() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut builder = GltfBuilder::new();
    let mesh = builder.add_mesh("Panel", &[quad(), triangle()]);
    let parent = builder.add_node(json!({ "name": "Root", "rotation": [0.0, 0.7071068, 0.0, 0.7071068] }));
    let child = builder.add_node(json!({ "name": "Child", "mesh": mesh }));
    builder.nodes_mut()[parent]["children"] = json!([child]);
    builder.add_root(parent);
    let input = write_input(dir.path(), "nested.glb", &builder.to_glb());

    let options = ConvertOptions {
        flip_handedness: true,
        flip_uv: true,
        hierarchy: HierarchyMode::Nested,
        ..ConvertOptions::default()
    };
    let ctx = ConversionContext::new(dir.path().join("unused"), options).unwrap();
    let (sink, _collector) = mitsuba_export::diagnostics::channel(&input);

    let mut scene = read(&input, &ctx, &sink).expect("Read failed");
    normalize(&mut scene, ctx.options(), &sink);
    let meshes = scene.meshes.clone();
    let transforms = scene.world_transforms();

    let second = normalize(&mut scene, ctx.options(), &sink);
    assert_eq!(scene.meshes, meshes);
    assert_eq!(scene.world_transforms(), transforms);
    assert_eq!(second, Default::default());
}

#[test]
fn test_indices_within_vertex_count() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut builder = red_triangle();
    let mesh = builder.add_mesh("Panel", &[quad()]);
    let node = builder.add_node(json!({ "name": "Panel", "mesh": mesh }));
    builder.add_root(node);
    let input = write_input(dir.path(), "scene.glb", &builder.to_glb());

    for format in [MeshFormat::Serialized, MeshFormat::Ply] {
        let out = dir.path().join(format!("{:?}", format));
        let options = ConvertOptions {
            mesh_format: format,
            ..ConvertOptions::default()
        };
        convert_with_options(&input, &out, options).expect("Conversion failed");
        for file in mesh_files(&out) {
            let mesh = decode_mesh(&std::fs::read(&file).unwrap()).expect("Failed to decode mesh");
            let n = mesh.vertex_count() as u32;
            assert!(mesh.indices.iter().flatten().all(|&i| i < n), "{:?}", file);
        }
    }
}

#[test]
fn test_embedded_texture_exported() {
    let mut builder = GltfBuilder::new();
    let texture = builder.add_texture(&png_bytes(2, 2, [255, 128, 0, 255]), "image/png");
    let mut material = pbr_material("Wood", [1.0, 1.0, 1.0, 1.0], 0.0, 0.8);
    material["pbrMetallicRoughness"]["baseColorTexture"] = json!({ "index": texture });
    let material = builder.add_material(material);
    let mesh = builder.add_mesh("Board", &[Primitive { material: Some(material), ..quad() }]);
    let node = builder.add_node(json!({ "name": "Board", "mesh": mesh }));
    builder.add_root(node);

    let dir = tempdir().expect("Failed to create temp dir");
    let input = write_input(dir.path(), "board.glb", &builder.to_glb());
    let out = dir.path().join("out");
    convert(&input, &out).expect("Conversion failed");

    let textures: Vec<_> = std::fs::read_dir(out.join("textures")).unwrap().collect();
    assert_eq!(textures.len(), 1);
    let xml = read_scene(&out);
    assert!(xml.contains(r#"<texture type="bitmap" name="base_color""#));
    assert!(xml.contains(r#"value="textures/"#));
}

#[test]
fn test_camera_and_light_emitted() {
    let mut builder = red_triangle();
    builder.use_extension("KHR_lights_punctual");
    builder.set_extension(
        "KHR_lights_punctual",
        json!({ "lights": [{ "type": "point", "color": [1.0, 1.0, 1.0], "intensity": 683.0 }] }),
    );
    builder.set_cameras(json!([{ "type": "perspective", "perspective": { "yfov": 0.8, "znear": 0.1, "zfar": 100.0 } }]));
    let camera = builder.add_node(json!({ "name": "Cam", "camera": 0, "translation": [0.0, 0.0, 5.0] }));
    let light = builder.add_node(json!({
        "name": "Lamp",
        "translation": [0.0, 3.0, 0.0],
        "extensions": { "KHR_lights_punctual": { "light": 0 } }
    }));
    builder.add_root(camera);
    builder.add_root(light);

    let dir = tempdir().expect("Failed to create temp dir");
    let input = write_input(dir.path(), "lit.glb", &builder.to_glb());
    let out = dir.path().join("out");
    convert(&input, &out).expect("Conversion failed");

    let xml = read_scene(&out);
    assert_eq!(xml.matches("<sensor ").count(), 1);
    assert!(xml.contains(r#"<lookat origin="0, 0, 5" target="0, 0, 4" up="0, 1, 0""#));
    assert!(xml.contains(r#"<emitter type="point""#));
    assert!(xml.contains(r#"<point name="position" x="0" y="3" z="0""#));
    assert!(xml.contains(r#"<rgb name="intensity" value="1, 1, 1""#));
    assert!(!xml.contains(r#"<emitter type="constant""#));
}
