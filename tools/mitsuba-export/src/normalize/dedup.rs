//! Vertex, face, texture, and material deduplication

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_64;

use crate::scene::{MaterialId, Mesh, MeshAttributes, MeshError, Scene, TextureId};

/// One vertex's attributes as hashable words. Inline for up to two UV sets.
type VertexKey = SmallVec<[u64; 16]>;

fn push_exact(key: &mut VertexKey, values: &[f32]) {
    // -0.0 and 0.0 weld together.
    key.extend(values.iter().map(|v| (v + 0.0).to_bits() as u64));
}

fn push_quantized(key: &mut VertexKey, values: &[f32], epsilon: f32) {
    key.extend(
        values
            .iter()
            .map(|v| ((*v as f64) / epsilon as f64).round() as i64 as u64),
    );
}

fn vertex_key(attributes: &MeshAttributes, index: usize, epsilon: f32) -> VertexKey {
    let mut key = VertexKey::new();
    let push = |key: &mut VertexKey, values: &[f32]| {
        if epsilon > 0.0 {
            push_quantized(key, values, epsilon)
        } else {
            push_exact(key, values)
        }
    };
    push(&mut key, &attributes.positions[index]);
    if let Some(normals) = &attributes.normals {
        push(&mut key, &normals[index]);
    }
    for set in &attributes.uv_sets {
        push(&mut key, &set[index]);
    }
    if let Some(colors) = &attributes.colors {
        push(&mut key, &colors[index]);
    }
    key
}

/// Weld vertices whose every attribute matches.
///
/// The vertex table is rebuilt in first-use order of the index list, keeping
/// the first vertex of each equivalence class verbatim, so a second pass is
/// the identity. Returns the number of vertices removed.
pub fn dedup_vertices(mesh: &mut Mesh, epsilon: f32) -> Result<usize, MeshError> {
    if mesh.triangle_count() == 0 {
        return Ok(0);
    }
    let source = mesh.attributes();
    let mut remap: HashMap<VertexKey, u32> = HashMap::with_capacity(source.positions.len());
    let mut kept: Vec<usize> = Vec::with_capacity(source.positions.len());
    let mut visited: Vec<Option<u32>> = vec![None; source.positions.len()];

    let indices: Vec<[u32; 3]> = source
        .indices
        .iter()
        .map(|tri| {
            tri.map(|i| {
                let i = i as usize;
                *visited[i].get_or_insert_with(|| {
                    *remap
                        .entry(vertex_key(source, i, epsilon))
                        .or_insert_with(|| {
                            kept.push(i);
                            (kept.len() - 1) as u32
                        })
                })
            })
        })
        .collect();

    let removed = source.positions.len() - kept.len();
    if removed == 0 && indices == source.indices {
        return Ok(0);
    }

    let attributes = MeshAttributes {
        positions: kept.iter().map(|&i| source.positions[i]).collect(),
        normals: source
            .normals
            .as_ref()
            .map(|n| kept.iter().map(|&i| n[i]).collect()),
        uv_sets: source
            .uv_sets
            .iter()
            .map(|set| kept.iter().map(|&i| set[i]).collect())
            .collect(),
        colors: source
            .colors
            .as_ref()
            .map(|c| kept.iter().map(|&i| c[i]).collect()),
        indices,
    };
    mesh.replace_attributes(attributes)?;
    Ok(removed)
}

/// Rotate a triangle so its smallest index comes first. Winding is kept, so
/// a mirrored copy of a face stays distinct.
fn face_key(tri: [u32; 3]) -> [u32; 3] {
    let [a, b, c] = tri;
    if a <= b && a <= c {
        [a, b, c]
    } else if b <= c {
        [b, c, a]
    } else {
        [c, a, b]
    }
}

/// Drop triangles that repeat an earlier one up to rotation.
///
/// Runs on welded indices, so faces over equal vertices compare equal. The
/// first occurrence is kept and order is preserved. Returns the number of
/// triangles removed.
pub fn dedup_faces(mesh: &mut Mesh) -> Result<usize, MeshError> {
    let source = mesh.attributes();
    let mut seen: HashSet<[u32; 3]> = HashSet::with_capacity(source.indices.len());
    let indices: Vec<[u32; 3]> = source
        .indices
        .iter()
        .copied()
        .filter(|tri| seen.insert(face_key(*tri)))
        .collect();

    let removed = source.indices.len() - indices.len();
    if removed == 0 {
        return Ok(0);
    }
    let attributes = MeshAttributes {
        indices,
        ..source.clone()
    };
    mesh.replace_attributes(attributes)?;
    Ok(removed)
}

/// Merge texture refs with equal dedup keys and compact the table.
///
/// Returns the number of refs removed.
pub fn dedup_textures(scene: &mut Scene) -> usize {
    let mut first: HashMap<_, TextureId> = HashMap::new();
    let mut remap: Vec<TextureId> = Vec::with_capacity(scene.textures.len());
    let mut kept = Vec::with_capacity(scene.textures.len());

    for texture in std::mem::take(&mut scene.textures) {
        let next = TextureId(kept.len());
        let id = *first.entry(texture.dedup_key()).or_insert(next);
        if id == next {
            kept.push(texture);
        }
        remap.push(id);
    }

    let removed = remap.len() - kept.len();
    scene.textures = kept;
    for material in &mut scene.materials {
        for id in material.texture_ids_mut() {
            *id = remap[id.0];
        }
    }
    removed
}

/// Merge materials with identical content (everything but the name).
///
/// Content is bucketed by xxh3 and compared in full within a bucket. The
/// first material of each group survives under its own name; mesh and node
/// references are remapped. Returns the number of materials removed.
pub fn dedup_materials(scene: &mut Scene) -> usize {
    let mut buckets: HashMap<u64, SmallVec<[(Vec<u8>, MaterialId); 1]>> = HashMap::new();
    let mut remap: Vec<MaterialId> = Vec::with_capacity(scene.materials.len());
    let mut kept = Vec::with_capacity(scene.materials.len());

    for material in std::mem::take(&mut scene.materials) {
        let content = material.content_bytes();
        let bucket = buckets.entry(xxh3_64(&content)).or_default();
        match bucket.iter().find(|(bytes, _)| *bytes == content) {
            Some((_, id)) => remap.push(*id),
            None => {
                let id = MaterialId(kept.len());
                kept.push(material);
                bucket.push((content, id));
                remap.push(id);
            }
        }
    }

    let removed = remap.len() - kept.len();
    scene.materials = kept;
    for mesh in &mut scene.meshes {
        if let Some(id) = &mut mesh.material {
            *id = remap[id.0];
        }
    }
    for node in scene.nodes_mut() {
        if let Some(id) = &mut node.material {
            *id = remap[id.0];
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{
        ColorSpace, Convention, Material, MaterialKind, Param, SourceFormat, TextureRef,
        TextureSource, TextureUsage, UvOrigin,
    };
    use std::path::PathBuf;

    fn quad_with_split_corners() -> Mesh {
        // Two triangles sharing an edge, stored as six separate vertices.
        let attributes = MeshAttributes {
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            normals: Some(vec![[0.0, 0.0, 1.0]; 6]),
            uv_sets: Vec::new(),
            colors: None,
            indices: vec![[0, 1, 2], [3, 4, 5]],
        };
        Mesh::new("quad", attributes, None).unwrap()
    }

    #[test]
    fn test_dedup_welds_shared_corners() {
        let mut mesh = quad_with_split_corners();
        assert_eq!(dedup_vertices(&mut mesh, 0.0).unwrap(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices(), &[[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let mut mesh = quad_with_split_corners();
        dedup_vertices(&mut mesh, 0.0).unwrap();
        let once = mesh.clone();
        assert_eq!(dedup_vertices(&mut mesh, 0.0).unwrap(), 0);
        assert_eq!(mesh, once);
    }

    #[test]
    fn test_dedup_keeps_distinct_normals() {
        let mut mesh = quad_with_split_corners();
        let mut attributes = mesh.attributes().clone();
        attributes.normals.as_mut().unwrap()[3] = [0.0, 1.0, 0.0];
        mesh.replace_attributes(attributes).unwrap();
        assert_eq!(dedup_vertices(&mut mesh, 0.0).unwrap(), 1);
        assert_eq!(mesh.vertex_count(), 5);
    }

    #[test]
    fn test_dedup_epsilon() {
        let mut mesh = quad_with_split_corners();
        let mut attributes = mesh.attributes().clone();
        attributes.positions[3] = [0.00001, 0.0, 0.0];
        mesh.replace_attributes(attributes).unwrap();

        let mut exact = mesh.clone();
        assert_eq!(dedup_vertices(&mut exact, 0.0).unwrap(), 1);
        assert_eq!(dedup_vertices(&mut mesh, 0.001).unwrap(), 2);
        // The first occurrence is kept verbatim.
        assert_eq!(mesh.positions()[0], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_negative_zero_welds() {
        let mut mesh = quad_with_split_corners();
        let mut attributes = mesh.attributes().clone();
        attributes.positions[3] = [-0.0, 0.0, 0.0];
        mesh.replace_attributes(attributes).unwrap();
        assert_eq!(dedup_vertices(&mut mesh, 0.0).unwrap(), 2);
    }

    #[test]
    fn test_face_dedup_drops_rotated_copies() {
        let attributes = MeshAttributes {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            indices: vec![[0, 1, 2], [0, 1, 2], [1, 2, 0], [0, 2, 1]],
            ..Default::default()
        };
        let mut mesh = Mesh::new("tri", attributes, None).unwrap();

        assert_eq!(dedup_faces(&mut mesh).unwrap(), 2);
        // The reversed face survives, order is first-seen.
        assert_eq!(mesh.indices(), &[[0, 1, 2], [0, 2, 1]]);
        assert_eq!(dedup_faces(&mut mesh).unwrap(), 0);
    }

    #[test]
    fn test_face_dedup_after_weld() {
        let attributes = MeshAttributes {
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0],
            ],
            indices: vec![[0, 1, 2], [3, 4, 5]],
            ..Default::default()
        };
        let mut mesh = Mesh::new("split", attributes, None).unwrap();
        assert_eq!(dedup_faces(&mut mesh).unwrap(), 0);

        dedup_vertices(&mut mesh, 0.0).unwrap();
        assert_eq!(dedup_faces(&mut mesh).unwrap(), 1);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
    }

    fn scene() -> Scene {
        Scene::new("s", "s.gltf", SourceFormat::Gltf, Convention::Y_UP_RIGHT, UvOrigin::TopLeft)
    }

    fn file_texture(path: &str) -> TextureRef {
        TextureRef::new(
            "t",
            TextureSource::File(PathBuf::from(path)),
            ColorSpace::Srgb,
            TextureUsage::BaseColor,
        )
    }

    #[test]
    fn test_textures_then_materials_merge() {
        let mut scene = scene();
        let a = scene.add_texture(file_texture("/a.png"));
        let b = scene.add_texture(file_texture("/a.png"));
        let c = scene.add_texture(file_texture("/c.png"));

        for (name, tex) in [("m0", a), ("m1", b), ("m2", c)] {
            let mut m = Material::new(name, MaterialKind::ObjMtl);
            m.set("map_Kd", Param::Texture(tex));
            scene.add_material(m);
        }
        let mesh = Mesh::new(
            "tri",
            MeshAttributes {
                positions: vec![[0.0; 3]; 3],
                indices: vec![[0, 1, 2]],
                ..Default::default()
            },
            Some(MaterialId(1)),
        )
        .unwrap();
        scene.add_mesh(mesh);

        assert_eq!(dedup_textures(&mut scene), 1);
        assert_eq!(scene.textures.len(), 2);
        assert_eq!(scene.materials[2].texture("map_Kd"), Some(TextureId(1)));

        assert_eq!(dedup_materials(&mut scene), 1);
        let names: Vec<&str> = scene.materials.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["m0", "m2"]);
        assert_eq!(scene.meshes[0].material, Some(MaterialId(0)));

        assert_eq!(dedup_textures(&mut scene), 0);
        assert_eq!(dedup_materials(&mut scene), 0);
    }
}
