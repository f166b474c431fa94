//! Intermediate scene graph
//!
//! A format-agnostic scene: a node tree plus tables of meshes, materials,
//! textures, cameras, and lights. The [`Scene`] owns every table; nodes and
//! meshes refer into them with typed index ids, so instancing and dedup are
//! plain table operations.
//!
//! Nodes can only be created through [`Scene::add_node`], which attaches the
//! new node under an existing parent. A node's descendant set therefore can
//! never contain itself.

mod camera;
mod material;
mod mesh;
mod texture;

pub use camera::{Camera, Light, LightKind, Projection};
pub use material::{AlphaMode, Material, MaterialKind, Param, PbrParams, UnsupportedFeature};
pub use mesh::{Aabb, Mesh, MeshAttributes, MeshError};
pub use texture::{Channel, ColorSpace, SourceIdentity, TextureRef, TextureSource, TextureUsage};

use std::path::PathBuf;

use glam::Mat4;
use serde::Serialize;

use crate::context::UpAxis;

macro_rules! table_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        pub struct $name(pub usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

table_id!(
    /// Index into [`Scene::nodes`]
    NodeId
);
table_id!(
    /// Index into [`Scene::meshes`]
    MeshId
);
table_id!(
    /// Index into [`Scene::materials`]
    MaterialId
);
table_id!(
    /// Index into [`Scene::textures`]
    TextureId
);
table_id!(CameraId);
table_id!(LightId);

/// Source container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Gltf,
    Obj,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Handedness {
    Right,
    Left,
}

/// Axis convention the scene's coordinates are currently expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Convention {
    pub up: UpAxis,
    pub handedness: Handedness,
}

impl Convention {
    pub const Y_UP_RIGHT: Self = Self {
        up: UpAxis::Y,
        handedness: Handedness::Right,
    };
}

/// Where `v = 0` sits on a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UvOrigin {
    TopLeft,
    BottomLeft,
}

/// One node of the scene tree
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    /// Local transform, relative to the parent
    pub transform: Mat4,
    pub mesh: Option<MeshId>,
    /// Overrides the mesh's own material when set
    pub material: Option<MaterialId>,
    pub camera: Option<CameraId>,
    pub light: Option<LightId>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, transform: Mat4) -> Self {
        Self {
            name: name.into(),
            transform,
            mesh: None,
            material: None,
            camera: None,
            light: None,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn with_mesh(mut self, mesh: MeshId) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// The intermediate scene graph
#[derive(Debug, Clone)]
pub struct Scene {
    pub name: String,
    pub source: PathBuf,
    pub format: SourceFormat,
    pub convention: Convention,
    pub uv_origin: UvOrigin,
    nodes: Vec<SceneNode>,
    roots: Vec<NodeId>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<TextureRef>,
    pub cameras: Vec<Camera>,
    pub lights: Vec<Light>,
}

impl Scene {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        format: SourceFormat,
        convention: Convention,
        uv_origin: UvOrigin,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            format,
            convention,
            uv_origin,
            nodes: Vec::new(),
            roots: Vec::new(),
            meshes: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            cameras: Vec::new(),
            lights: Vec::new(),
        }
    }

    /// Append a node under `parent` (or as a new root) and return its id.
    ///
    /// Any children or parent already set on `node` are discarded.
    ///
    /// # Panics
    /// If `parent` is not a node of this scene.
    pub fn add_node(&mut self, parent: Option<NodeId>, mut node: SceneNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.children.clear();
        node.parent = parent;
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        self.nodes.push(node);
        id
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    pub fn add_texture(&mut self, texture: TextureRef) -> TextureId {
        self.textures.push(texture);
        TextureId(self.textures.len() - 1)
    }

    pub fn add_camera(&mut self, camera: Camera) -> CameraId {
        self.cameras.push(camera);
        CameraId(self.cameras.len() - 1)
    }

    pub fn add_light(&mut self, light: Light) -> LightId {
        self.lights.push(light);
        LightId(self.lights.len() - 1)
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id.0]
    }

    /// Mutable access to a node's payload. Tree links stay private.
    pub fn node_mut(&mut self, id: NodeId) -> &mut SceneNode {
        &mut self.nodes[id.0]
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut SceneNode> {
        self.nodes.iter_mut()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// All nodes, depth-first, parents before children, siblings in order
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    /// World transform of every node, indexed by node id
    pub fn world_transforms(&self) -> Vec<Mat4> {
        let mut world = vec![Mat4::IDENTITY; self.nodes.len()];
        for id in self.depth_first() {
            let node = &self.nodes[id.0];
            world[id.0] = match node.parent {
                Some(p) => world[p.0] * node.transform,
                None => node.transform,
            };
        }
        world
    }

    /// Local transforms from `id` up to its root, nearest first
    pub fn transform_chain(&self, id: NodeId) -> Vec<Mat4> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id.0];
            chain.push(node.transform);
            current = node.parent;
        }
        chain
    }

    /// Replace the tree by one root per node carrying its world transform.
    ///
    /// Node ids are preserved; the root order is the previous depth-first
    /// order. Applying this to an already flat scene changes nothing.
    pub fn flatten(&mut self) {
        let world = self.world_transforms();
        let order = self.depth_first();
        for (node, transform) in self.nodes.iter_mut().zip(world) {
            node.transform = transform;
            node.children.clear();
            node.parent = None;
        }
        self.roots = order;
    }

    /// Material a node renders with: its override, else its mesh's material
    pub fn effective_material(&self, id: NodeId) -> Option<MaterialId> {
        let node = &self.nodes[id.0];
        node.material
            .or_else(|| node.mesh.and_then(|m| self.meshes[m.0].material))
    }

    /// Number of nodes referring to each mesh
    pub fn mesh_reference_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.meshes.len()];
        for node in &self.nodes {
            if let Some(mesh) = node.mesh {
                counts[mesh.0] += 1;
            }
        }
        counts
    }

    /// World-space bounds of all mesh instances, if there are any
    pub fn world_bounds(&self) -> Option<Aabb> {
        let world = self.world_transforms();
        self.nodes
            .iter()
            .zip(&world)
            .filter_map(|(node, m)| node.mesh.map(|mesh| self.meshes[mesh.0].bounds().transformed(m)))
            .reduce(|a, b| a.union(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn empty_scene() -> Scene {
        Scene::new(
            "test",
            "test.gltf",
            SourceFormat::Gltf,
            Convention::Y_UP_RIGHT,
            UvOrigin::TopLeft,
        )
    }

    fn translated(name: &str, x: f32) -> SceneNode {
        SceneNode::new(name, Mat4::from_translation(Vec3::new(x, 0.0, 0.0)))
    }

    #[test]
    fn test_depth_first_order() {
        let mut scene = empty_scene();
        let a = scene.add_node(None, translated("a", 1.0));
        let b = scene.add_node(None, translated("b", 0.0));
        let a1 = scene.add_node(Some(a), translated("a1", 0.0));
        let a1x = scene.add_node(Some(a1), translated("a1x", 0.0));
        let a2 = scene.add_node(Some(a), translated("a2", 0.0));

        assert_eq!(scene.depth_first(), vec![a, a1, a1x, a2, b]);
    }

    #[test]
    fn test_world_transforms_compose_parent_first() {
        let mut scene = empty_scene();
        let parent = scene.add_node(None, translated("p", 1.0));
        let child = scene.add_node(Some(parent), translated("c", 2.0));

        let world = scene.world_transforms();
        let origin = world[child.index()].transform_point3(Vec3::ZERO);
        assert_eq!(origin, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(scene.transform_chain(child).len(), 2);
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let mut scene = empty_scene();
        let parent = scene.add_node(None, translated("p", 1.0));
        let child = scene.add_node(Some(parent), translated("c", 2.0));

        scene.flatten();
        assert_eq!(scene.roots(), &[parent, child]);
        assert!(scene.node(parent).children().is_empty());
        let once: Vec<Mat4> = scene.nodes().iter().map(|n| n.transform).collect();

        scene.flatten();
        let twice: Vec<Mat4> = scene.nodes().iter().map(|n| n.transform).collect();
        assert_eq!(once, twice);
        assert_eq!(
            scene.node(child).transform.transform_point3(Vec3::ZERO),
            Vec3::new(3.0, 0.0, 0.0)
        );
    }
}
