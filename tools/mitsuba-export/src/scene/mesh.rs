//! Triangle meshes

use glam::{Mat3, Mat4, Vec3};

use super::MaterialId;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: &[[f32; 3]]) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for p in points {
            let p = Vec3::from_array(*p);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Bounds of the 8 transformed corners
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        let corners: Vec<[f32; 3]> = (0..8)
            .map(|i| {
                let c = Vec3::new(
                    if i & 1 == 0 { self.min.x } else { self.max.x },
                    if i & 2 == 0 { self.min.y } else { self.max.y },
                    if i & 4 == 0 { self.min.z } else { self.max.z },
                );
                m.transform_point3(c).to_array()
            })
            .collect();
        Aabb::from_points(&corners)
    }
}

/// Invalid mesh construction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("mesh has no vertices")]
    NoVertices,

    #[error("{attribute} has {actual} entries, expected {expected} (one per vertex)")]
    AttributeLength {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("triangle {triangle} references vertex {index}, but mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },
}

/// Raw per-vertex data and triangles. All present attributes have one entry per position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshAttributes {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    /// Zero or more UV sets, set 0 first
    pub uv_sets: Vec<Vec<[f32; 2]>>,
    /// Linear RGBA
    pub colors: Option<Vec<[f32; 4]>>,
    pub indices: Vec<[u32; 3]>,
}

impl MeshAttributes {
    pub fn validate(&self) -> Result<(), MeshError> {
        let n = self.positions.len();
        if n == 0 {
            return Err(MeshError::NoVertices);
        }
        let check = |attribute: &'static str, actual: usize| {
            if actual == n {
                Ok(())
            } else {
                Err(MeshError::AttributeLength {
                    attribute,
                    expected: n,
                    actual,
                })
            }
        };
        if let Some(normals) = &self.normals {
            check("normals", normals.len())?;
        }
        for set in &self.uv_sets {
            check("uv set", set.len())?;
        }
        if let Some(colors) = &self.colors {
            check("colors", colors.len())?;
        }
        for (triangle, tri) in self.indices.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= n) {
                return Err(MeshError::IndexOutOfRange {
                    triangle,
                    index,
                    vertex_count: n,
                });
            }
        }
        Ok(())
    }
}

/// A validated triangle mesh
///
/// Attributes are only reachable through methods that keep the invariants:
/// every index is below the vertex count, and the bounds always describe the
/// current positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub material: Option<MaterialId>,
    attributes: MeshAttributes,
    bounds: Aabb,
}

impl Mesh {
    pub fn new(
        name: impl Into<String>,
        attributes: MeshAttributes,
        material: Option<MaterialId>,
    ) -> Result<Self, MeshError> {
        attributes.validate()?;
        let bounds = Aabb::from_points(&attributes.positions);
        Ok(Self {
            name: name.into(),
            material,
            attributes,
            bounds,
        })
    }

    pub fn attributes(&self) -> &MeshAttributes {
        &self.attributes
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.attributes.positions
    }

    pub fn normals(&self) -> Option<&[[f32; 3]]> {
        self.attributes.normals.as_deref()
    }

    pub fn uv_sets(&self) -> &[Vec<[f32; 2]>] {
        &self.attributes.uv_sets
    }

    pub fn colors(&self) -> Option<&[[f32; 4]]> {
        self.attributes.colors.as_deref()
    }

    pub fn indices(&self) -> &[[u32; 3]] {
        &self.attributes.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.attributes.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.attributes.indices.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Swap in a new attribute set after validating it
    pub fn replace_attributes(&mut self, attributes: MeshAttributes) -> Result<(), MeshError> {
        attributes.validate()?;
        self.bounds = Aabb::from_points(&attributes.positions);
        self.attributes = attributes;
        Ok(())
    }

    /// Transform positions by `m` and normals by its normal matrix
    pub fn transform(&mut self, m: &Mat4) {
        for p in &mut self.attributes.positions {
            *p = m.transform_point3(Vec3::from_array(*p)).to_array();
        }
        if let Some(normals) = &mut self.attributes.normals {
            let normal_matrix = Mat3::from_mat4(*m).inverse().transpose();
            for n in normals.iter_mut() {
                *n = (normal_matrix * Vec3::from_array(*n))
                    .normalize_or_zero()
                    .to_array();
            }
        }
        self.bounds = Aabb::from_points(&self.attributes.positions);
    }

    /// Reverse the vertex order of every triangle
    pub fn flip_winding(&mut self) {
        for tri in &mut self.attributes.indices {
            tri.swap(1, 2);
        }
    }

    /// `v -> 1 - v` on every UV set
    pub fn flip_v(&mut self) {
        for set in &mut self.attributes.uv_sets {
            for uv in set.iter_mut() {
                uv[1] = 1.0 - uv[1];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshAttributes {
        MeshAttributes {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, 0.0]],
            normals: Some(vec![[0.0, 0.0, 1.0]; 3]),
            uv_sets: vec![vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]],
            colors: None,
            indices: vec![[0, 1, 2]],
        }
    }

    #[test]
    fn test_new_computes_bounds() {
        let mesh = Mesh::new("tri", triangle(), None).unwrap();
        assert_eq!(mesh.bounds().min, Vec3::ZERO);
        assert_eq!(mesh.bounds().max, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_new_rejects_dangling_index() {
        let mut attrs = triangle();
        attrs.indices.push([1, 2, 3]);
        assert_eq!(
            Mesh::new("tri", attrs, None).unwrap_err(),
            MeshError::IndexOutOfRange {
                triangle: 1,
                index: 3,
                vertex_count: 3
            }
        );
    }

    #[test]
    fn test_new_rejects_short_uv_set() {
        let mut attrs = triangle();
        attrs.uv_sets[0].pop();
        assert!(matches!(
            Mesh::new("tri", attrs, None),
            Err(MeshError::AttributeLength { attribute: "uv set", .. })
        ));
    }

    #[test]
    fn test_transform_recomputes_bounds() {
        let mut mesh = Mesh::new("tri", triangle(), None).unwrap();
        mesh.transform(&Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        assert_eq!(mesh.bounds().min.z, 5.0);
        assert_eq!(mesh.bounds().max.z, 5.0);
    }

    #[test]
    fn test_flip_winding_and_uv() {
        let mut mesh = Mesh::new("tri", triangle(), None).unwrap();
        mesh.flip_winding();
        mesh.flip_v();
        assert_eq!(mesh.indices(), &[[0, 2, 1]]);
        assert_eq!(mesh.uv_sets()[0][2], [0.0, 0.0]);
    }

    #[test]
    fn test_transformed_bounds() {
        let aabb = Aabb {
            min: Vec3::ZERO,
            max: Vec3::ONE,
        };
        let moved = aabb.transformed(&Mat4::from_scale(Vec3::splat(2.0)));
        assert_eq!(moved.max, Vec3::splat(2.0));
    }
}
