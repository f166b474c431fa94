//! Source materials
//!
//! Each material keeps its source parameters untouched in a [`Param`] bag,
//! tagged with the [`MaterialKind`] that says how to read the bag. Readers
//! that understand metallic-roughness also fill [`PbrParams`].

use std::collections::BTreeMap;

use super::TextureId;

/// Which source schema `Material::params` follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    /// glTF core `pbrMetallicRoughness`
    GltfMetallicRoughness,
    /// glTF `KHR_materials_pbrSpecularGlossiness`
    GltfSpecularGlossiness,
    /// Wavefront MTL (classic Phong keys, optional PBR extension keys)
    ObjMtl,
}

impl MaterialKind {
    fn tag(self) -> u8 {
        match self {
            MaterialKind::GltfMetallicRoughness => 0,
            MaterialKind::GltfSpecularGlossiness => 1,
            MaterialKind::ObjMtl => 2,
        }
    }
}

/// One named slot of a source parameter bag
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Scalar(f32),
    Vector(Vec<f32>),
    Texture(TextureId),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlphaMode {
    Opaque,
    Mask { cutoff: f32 },
    Blend,
}

/// Normalized metallic-roughness subset
#[derive(Debug, Clone, PartialEq)]
pub struct PbrParams {
    /// Linear RGBA
    pub base_color: [f32; 4],
    pub base_color_texture: Option<TextureId>,
    pub metallic: f32,
    pub roughness: f32,
    pub metallic_texture: Option<TextureId>,
    pub roughness_texture: Option<TextureId>,
    pub normal_texture: Option<TextureId>,
    pub normal_scale: f32,
    /// Linear RGB, already multiplied by any emissive strength
    pub emissive: [f32; 3],
    pub emissive_texture: Option<TextureId>,
    /// Alpha channel of the base color texture, when alpha is not opaque
    pub opacity_texture: Option<TextureId>,
    pub ior: Option<f32>,
    pub transmission: f32,
}

impl Default for PbrParams {
    fn default() -> Self {
        Self {
            base_color: [1.0; 4],
            base_color_texture: None,
            metallic: 1.0,
            roughness: 1.0,
            metallic_texture: None,
            roughness_texture: None,
            normal_texture: None,
            normal_scale: 1.0,
            emissive: [0.0; 3],
            emissive_texture: None,
            opacity_texture: None,
            ior: None,
            transmission: 0.0,
        }
    }
}

impl PbrParams {
    fn textures_mut(&mut self) -> impl Iterator<Item = &mut TextureId> {
        [
            &mut self.base_color_texture,
            &mut self.metallic_texture,
            &mut self.roughness_texture,
            &mut self.normal_texture,
            &mut self.emissive_texture,
            &mut self.opacity_texture,
        ]
        .into_iter()
        .flatten()
    }
}

/// A recognized source feature with no target equivalent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedFeature {
    /// e.g. `KHR_materials_clearcoat`, `Pc`
    pub feature: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    pub params: BTreeMap<String, Param>,
    pub pbr: Option<PbrParams>,
    pub double_sided: bool,
    pub alpha: AlphaMode,
    pub unsupported: Vec<UnsupportedFeature>,
}

impl Material {
    pub fn new(name: impl Into<String>, kind: MaterialKind) -> Self {
        Self {
            name: name.into(),
            kind,
            params: BTreeMap::new(),
            pbr: None,
            double_sided: false,
            alpha: AlphaMode::Opaque,
            unsupported: Vec::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Param) {
        self.params.insert(key.into(), value);
    }

    pub fn scalar(&self, key: &str) -> Option<f32> {
        match self.params.get(key) {
            Some(Param::Scalar(v)) => Some(*v),
            Some(Param::Vector(v)) => v.first().copied(),
            _ => None,
        }
    }

    /// First three components of a vector slot; a scalar slot is splatted
    pub fn rgb(&self, key: &str) -> Option<[f32; 3]> {
        match self.params.get(key) {
            Some(Param::Vector(v)) if v.len() >= 3 => Some([v[0], v[1], v[2]]),
            Some(Param::Vector(v)) if v.len() == 1 => Some([v[0]; 3]),
            Some(Param::Scalar(v)) => Some([*v; 3]),
            _ => None,
        }
    }

    pub fn texture(&self, key: &str) -> Option<TextureId> {
        match self.params.get(key) {
            Some(Param::Texture(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn mark_unsupported(&mut self, feature: impl Into<String>, detail: impl Into<String>) {
        let feature = feature.into();
        if !self.unsupported.iter().any(|u| u.feature == feature) {
            self.unsupported.push(UnsupportedFeature {
                feature,
                detail: detail.into(),
            });
        }
    }

    /// Every texture reference held by this material
    pub fn texture_ids_mut(&mut self) -> impl Iterator<Item = &mut TextureId> {
        let bag = self.params.values_mut().filter_map(|p| match p {
            Param::Texture(id) => Some(id),
            _ => None,
        });
        bag.chain(self.pbr.iter_mut().flat_map(PbrParams::textures_mut))
    }

    /// Canonical byte encoding of everything except the name.
    ///
    /// Two materials with equal content bytes render identically, so they
    /// can be merged.
    pub fn content_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.push(self.kind.tag());
        out.push(self.double_sided as u8);
        match self.alpha {
            AlphaMode::Opaque => out.push(0),
            AlphaMode::Mask { cutoff } => {
                out.push(1);
                put_f32(&mut out, cutoff);
            }
            AlphaMode::Blend => out.push(2),
        }

        put_u64(&mut out, self.params.len() as u64);
        for (key, value) in &self.params {
            put_str(&mut out, key);
            match value {
                Param::Scalar(v) => {
                    out.push(0);
                    put_f32(&mut out, *v);
                }
                Param::Vector(v) => {
                    out.push(1);
                    put_u64(&mut out, v.len() as u64);
                    v.iter().for_each(|x| put_f32(&mut out, *x));
                }
                Param::Texture(id) => {
                    out.push(2);
                    put_u64(&mut out, id.0 as u64);
                }
                Param::Text(s) => {
                    out.push(3);
                    put_str(&mut out, s);
                }
            }
        }

        match &self.pbr {
            None => out.push(0),
            Some(pbr) => {
                out.push(1);
                pbr.base_color.iter().for_each(|x| put_f32(&mut out, *x));
                put_f32(&mut out, pbr.metallic);
                put_f32(&mut out, pbr.roughness);
                put_f32(&mut out, pbr.normal_scale);
                pbr.emissive.iter().for_each(|x| put_f32(&mut out, *x));
                put_opt_f32(&mut out, pbr.ior);
                put_f32(&mut out, pbr.transmission);
                for tex in [
                    pbr.base_color_texture,
                    pbr.metallic_texture,
                    pbr.roughness_texture,
                    pbr.normal_texture,
                    pbr.emissive_texture,
                    pbr.opacity_texture,
                ] {
                    match tex {
                        Some(id) => {
                            out.push(1);
                            put_u64(&mut out, id.0 as u64);
                        }
                        None => out.push(0),
                    }
                }
            }
        }

        put_u64(&mut out, self.unsupported.len() as u64);
        for u in &self.unsupported {
            put_str(&mut out, &u.feature);
            put_str(&mut out, &u.detail);
        }
        out
    }
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_bits().to_le_bytes());
}

fn put_opt_f32(out: &mut Vec<u8>, v: Option<f32>) {
    match v {
        Some(v) => {
            out.push(1);
            put_f32(out, v);
        }
        None => out.push(0),
    }
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u64(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}
