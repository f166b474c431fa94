//! Programmatic glTF/GLB generation for integration tests.
//!
//! [`GltfBuilder`] packs geometry into one binary buffer and collects the
//! document as JSON, then writes either a GLB (buffer in the BIN chunk) or
//! a `.gltf` (buffer as a base64 data URI).

#![allow(dead_code)]

mod glb_assembly;

use base64::Engine;
use serde_json::{json, Value};

pub use glb_assembly::assemble_glb;

/// Geometry of one triangle primitive
#[derive(Clone)]
pub struct Primitive {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub indices: Vec<u16>,
    pub material: Option<usize>,
}

/// One triangle in the XY plane
pub fn triangle() -> Primitive {
    Primitive {
        positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        normals: None,
        uvs: None,
        indices: vec![0, 1, 2],
        material: None,
    }
}

/// Unit quad in the XY plane with normals and UVs
pub fn quad() -> Primitive {
    Primitive {
        positions: vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
        normals: Some(vec![[0.0, 0.0, 1.0]; 4]),
        uvs: Some(vec![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]),
        indices: vec![0, 1, 2, 0, 2, 3],
        material: None,
    }
}

/// Metallic-roughness material JSON
pub fn pbr_material(name: &str, base_color: [f32; 4], metallic: f32, roughness: f32) -> Value {
    json!({
        "name": name,
        "pbrMetallicRoughness": {
            "baseColorFactor": base_color,
            "metallicFactor": metallic,
            "roughnessFactor": roughness,
        }
    })
}

/// Accumulates a glTF document and its binary buffer
#[derive(Default)]
pub struct GltfBuilder {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
    meshes: Vec<Value>,
    materials: Vec<Value>,
    images: Vec<Value>,
    textures: Vec<Value>,
    nodes: Vec<Value>,
    roots: Vec<usize>,
    cameras: Option<Value>,
    extensions: serde_json::Map<String, Value>,
    extensions_used: Vec<String>,
}

impl GltfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn align(&mut self) {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
    }

    fn add_view(&mut self, bytes: &[u8], target: Option<u32>) -> usize {
        self.align();
        let mut view = json!({
            "buffer": 0,
            "byteOffset": self.bin.len(),
            "byteLength": bytes.len(),
        });
        if let Some(target) = target {
            view["target"] = json!(target);
        }
        self.bin.extend_from_slice(bytes);
        self.views.push(view);
        self.views.len() - 1
    }

    fn add_float_accessor<const N: usize>(&mut self, data: &[[f32; N]], type_: &str, bounds: bool) -> usize {
        let bytes: Vec<u8> = data.iter().flatten().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.add_view(&bytes, Some(34962));
        let mut accessor = json!({
            "bufferView": view,
            "componentType": 5126,
            "count": data.len(),
            "type": type_,
        });
        if bounds {
            let mut min = [f32::MAX; N];
            let mut max = [f32::MIN; N];
            for item in data {
                for i in 0..N {
                    min[i] = min[i].min(item[i]);
                    max[i] = max[i].max(item[i]);
                }
            }
            accessor["min"] = json!(min.to_vec());
            accessor["max"] = json!(max.to_vec());
        }
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn add_index_accessor(&mut self, indices: &[u16]) -> usize {
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let view = self.add_view(&bytes, Some(34963));
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": 5123,
            "count": indices.len(),
            "type": "SCALAR",
        }));
        self.accessors.len() - 1
    }

    /// Add a mesh made of the given primitives
    pub fn add_mesh(&mut self, name: &str, primitives: &[Primitive]) -> usize {
        let mut out = Vec::new();
        for primitive in primitives {
            let mut attributes = json!({
                "POSITION": self.add_float_accessor(&primitive.positions, "VEC3", true),
            });
            if let Some(normals) = &primitive.normals {
                attributes["NORMAL"] = json!(self.add_float_accessor(normals, "VEC3", false));
            }
            if let Some(uvs) = &primitive.uvs {
                attributes["TEXCOORD_0"] = json!(self.add_float_accessor(uvs, "VEC2", false));
            }
            let mut value = json!({
                "attributes": attributes,
                "indices": self.add_index_accessor(&primitive.indices),
            });
            if let Some(material) = primitive.material {
                value["material"] = json!(material);
            }
            out.push(value);
        }
        self.meshes.push(json!({ "name": name, "primitives": out }));
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self, material: Value) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    /// Embed an encoded image in the buffer and add a texture sampling it
    pub fn add_texture(&mut self, bytes: &[u8], mime_type: &str) -> usize {
        let view = self.add_view(bytes, None);
        self.images.push(json!({ "bufferView": view, "mimeType": mime_type }));
        self.textures.push(json!({ "source": self.images.len() - 1 }));
        self.textures.len() - 1
    }

    /// Add a node; it is not part of the scene until attached with [`Self::add_root`]
    pub fn add_node(&mut self, node: Value) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_root(&mut self, node: usize) {
        self.roots.push(node);
    }

    /// Node JSON, for wiring up `children` after the fact
    pub fn nodes_mut(&mut self) -> &mut Vec<Value> {
        &mut self.nodes
    }

    pub fn set_cameras(&mut self, cameras: Value) {
        self.cameras = Some(cameras);
    }

    /// Document-level extension payload, e.g. `KHR_lights_punctual` lights
    pub fn set_extension(&mut self, name: &str, value: Value) {
        self.extensions.insert(name.to_string(), value);
    }

    pub fn use_extension(&mut self, name: &str) {
        if !self.extensions_used.iter().any(|e| e == name) {
            self.extensions_used.push(name.to_string());
        }
    }

    fn document(&self, buffer: Value) -> Value {
        let mut root = json!({
            "asset": { "version": "2.0", "generator": "mitsuba-export tests" },
            "scene": 0,
            "scenes": [{ "nodes": self.roots }],
            "nodes": self.nodes,
            "meshes": self.meshes,
            "accessors": self.accessors,
            "bufferViews": self.views,
            "buffers": [buffer],
        });
        if !self.materials.is_empty() {
            root["materials"] = json!(self.materials);
        }
        if !self.textures.is_empty() {
            root["images"] = json!(self.images);
            root["textures"] = json!(self.textures);
        }
        if let Some(cameras) = &self.cameras {
            root["cameras"] = cameras.clone();
        }
        if !self.extensions.is_empty() {
            root["extensions"] = Value::Object(self.extensions.clone());
        }
        if !self.extensions_used.is_empty() {
            root["extensionsUsed"] = json!(self.extensions_used);
        }
        root
    }

    pub fn to_glb(&self) -> Vec<u8> {
        let root = self.document(json!({ "byteLength": self.bin.len() }));
        assemble_glb(&root, &self.bin)
    }

    /// `.gltf` text with the buffer inlined as a data URI
    pub fn to_gltf(&self) -> String {
        let uri = format!(
            "data:application/octet-stream;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.bin)
        );
        let root = self.document(json!({ "byteLength": self.bin.len(), "uri": uri }));
        serde_json::to_string_pretty(&root).expect("Failed to serialize JSON")
    }
}

/// A tiny RGBA PNG
pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    out.into_inner()
}
