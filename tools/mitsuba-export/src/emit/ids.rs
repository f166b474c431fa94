//! Document ids
//!
//! One namespace covers every `id` attribute in the scene file. The shared
//! default BSDF (if any shape needs it) always owns `default_bsdf`; the rest
//! are handed out in a fixed order: materials in table order, then shapes in
//! depth-first node order.

use crate::material::MappedMaterial;
use crate::naming::IdAllocator;
use crate::scene::{NodeId, Scene};

pub const DEFAULT_BSDF_ID: &str = "default_bsdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneIds {
    /// Indexed by material id
    pub materials: Vec<String>,
    pub default_bsdf: Option<String>,
    /// Shape-carrying nodes in emission order
    pub shapes: Vec<(NodeId, String)>,
}

impl SceneIds {
    pub fn assign(scene: &Scene, materials: &[MappedMaterial]) -> Self {
        let shape_nodes: Vec<NodeId> = scene
            .depth_first()
            .into_iter()
            .filter(|id| scene.node(*id).mesh.is_some())
            .collect();

        let mut ids = IdAllocator::new();
        let needs_default = shape_nodes
            .iter()
            .any(|id| scene.effective_material(*id).is_none());
        let default_bsdf = needs_default.then(|| {
            ids.reserve(DEFAULT_BSDF_ID);
            DEFAULT_BSDF_ID.to_string()
        });

        let materials: Vec<String> = materials
            .iter()
            .map(|m| ids.allocate(&m.name, "material"))
            .collect();

        let shapes = shape_nodes
            .into_iter()
            .map(|id| (id, ids.allocate(&scene.node(id).name, "shape")))
            .collect();

        Self {
            materials,
            default_bsdf,
            shapes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{
        Convention, MaterialId, Mesh, MeshAttributes, SceneNode, SourceFormat, UvOrigin,
    };
    use glam::Mat4;

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let mut scene = Scene::new("s", "s.gltf", SourceFormat::Gltf, Convention::Y_UP_RIGHT, UvOrigin::TopLeft);
        let attributes = MeshAttributes {
            positions: vec![[0.0; 3]; 3],
            indices: vec![[0, 1, 2]],
            ..Default::default()
        };
        let red = scene.add_mesh(Mesh::new("a", attributes.clone(), Some(MaterialId(0))).unwrap());
        let plain = scene.add_mesh(Mesh::new("b", attributes, None).unwrap());
        let root = scene.add_node(None, SceneNode::new("Red", Mat4::IDENTITY).with_mesh(red));
        scene.add_node(Some(root), SceneNode::new("red", Mat4::IDENTITY).with_mesh(plain));
        scene.add_node(None, SceneNode::new("empty", Mat4::IDENTITY));

        let ids = SceneIds::assign(&scene, &[MappedMaterial::neutral("red")]);
        assert_eq!(ids.materials, vec!["red"]);
        assert_eq!(ids.default_bsdf.as_deref(), Some("default_bsdf"));
        let shapes: Vec<&str> = ids.shapes.iter().map(|(_, id)| id.as_str()).collect();
        assert_eq!(shapes, vec!["red_1", "red_2"]);
    }

    #[test]
    fn test_default_bsdf_keeps_its_id() {
        let mut scene = Scene::new("s", "s.obj", SourceFormat::Obj, Convention::Y_UP_RIGHT, UvOrigin::TopLeft);
        let attributes = MeshAttributes {
            positions: vec![[0.0; 3]; 3],
            indices: vec![[0, 1, 2]],
            ..Default::default()
        };
        let named = scene.add_mesh(Mesh::new("a", attributes.clone(), Some(MaterialId(0))).unwrap());
        let plain = scene.add_mesh(Mesh::new("b", attributes, None).unwrap());
        scene.add_node(None, SceneNode::new("named", Mat4::IDENTITY).with_mesh(named));
        scene.add_node(None, SceneNode::new("plain", Mat4::IDENTITY).with_mesh(plain));

        let ids = SceneIds::assign(&scene, &[MappedMaterial::neutral("Default BSDF")]);
        assert_eq!(ids.default_bsdf.as_deref(), Some("default_bsdf"));
        assert_eq!(ids.materials, vec!["default_bsdf_1"]);

        // Without an unassigned shape the name is free for materials.
        let mut all_named = scene.clone();
        all_named.meshes[1].material = Some(MaterialId(0));
        let ids = SceneIds::assign(&all_named, &[MappedMaterial::neutral("Default BSDF")]);
        assert_eq!(ids.default_bsdf, None);
        assert_eq!(ids.materials, vec!["default_bsdf"]);
    }
}
