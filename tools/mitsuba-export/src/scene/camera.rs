//! Cameras and punctual lights
//!
//! Both are attached to nodes and take their placement from the node's
//! world transform. `forward` and `up` are expressed in the node's local
//! frame, so a coordinate conversion only has to remap them once.

use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians
        yfov: f32,
        aspect_ratio: Option<f32>,
        znear: f32,
        zfar: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub name: String,
    pub projection: Projection,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Camera {
    /// A camera looking down local -Z with +Y up
    pub fn new(name: impl Into<String>, projection: Projection) -> Self {
        Self {
            name: name.into(),
            projection,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Point,
    /// Cone angles in radians
    Spot { inner_cone: f32, outer_cone: f32 },
    Directional,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub name: String,
    pub kind: LightKind,
    /// Linear RGB
    pub color: [f32; 3],
    /// Candela for point/spot, lux for directional
    pub intensity: f32,
    pub range: Option<f32>,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Light {
    /// A light shining down local -Z
    pub fn new(name: impl Into<String>, kind: LightKind, color: [f32; 3], intensity: f32) -> Self {
        Self {
            name: name.into(),
            kind,
            color,
            intensity,
            range: None,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}
