//! Material mapping
//!
//! Turns each source [`Material`] into a [`MappedMaterial`]: a base BSDF
//! picked by the rule table in [`rules`], plus the wrappers Mitsuba
//! expresses as nested BSDFs. From the inside out:
//!
//! ```text
//! mask( twosided( normalmap|bumpmap( base ) ) )
//! ```
//!
//! Mapping never fails. A material no rule accepts becomes a neutral gray
//! `diffuse` with a warning; every recognized but unmappable feature is
//! reported once.

mod rules;
pub mod units;

use rayon::prelude::*;
use serde::Serialize;

use crate::context::ConvertOptions;
use crate::diagnostics::{Stage, Subject, WarningSink};
use crate::scene::{AlphaMode, Material, MaterialKind, Scene, TextureId};

/// `(feature, message)` pairs collected while mapping one material
pub(crate) type Notes = Vec<(String, String)>;

/// Spectrum-valued BSDF parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorParam {
    /// Linear RGB
    Rgb([f32; 3]),
    Texture(TextureId),
}

/// Float-valued BSDF parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FloatParam {
    Value(f32),
    Texture(TextureId),
}

/// Base scattering model
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bsdf {
    Principled {
        base_color: ColorParam,
        metallic: FloatParam,
        roughness: FloatParam,
        eta: Option<f32>,
        spec_trans: f32,
    },
    RoughPlastic {
        diffuse_reflectance: ColorParam,
        specular_reflectance: Option<ColorParam>,
        /// Beckmann roughness
        alpha: f32,
        int_ior: f32,
    },
    Diffuse {
        reflectance: ColorParam,
    },
}

impl Bsdf {
    pub fn plugin(&self) -> &'static str {
        match self {
            Bsdf::Principled { .. } => "principled",
            Bsdf::RoughPlastic { .. } => "roughplastic",
            Bsdf::Diffuse { .. } => "diffuse",
        }
    }

    pub fn is_transmissive(&self) -> bool {
        matches!(self, Bsdf::Principled { spec_trans, .. } if *spec_trans > 0.0)
    }
}

/// Shading-normal perturbation wrapped around the base BSDF
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceDetail {
    NormalMap(TextureId),
    BumpMap { texture: TextureId, scale: f32 },
}

/// Which rule produced a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingRule {
    Principled,
    RoughPlastic,
    Diffuse,
    /// No rule applied; neutral gray diffuse
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappedMaterial {
    pub name: String,
    pub rule: MappingRule,
    pub bsdf: Bsdf,
    pub detail: Option<SurfaceDetail>,
    pub two_sided: bool,
    /// Wraps everything in `mask` when set
    pub opacity: Option<FloatParam>,
    /// Radiance of an area emitter attached to shapes using this material
    pub emission: Option<ColorParam>,
}

/// Gray used for meshes without a material and for unmappable ones
pub const DEFAULT_GRAY: [f32; 3] = [0.5; 3];

impl MappedMaterial {
    /// Neutral material for meshes that reference none
    pub fn neutral(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rule: MappingRule::Default,
            bsdf: Bsdf::Diffuse {
                reflectance: ColorParam::Rgb(DEFAULT_GRAY),
            },
            detail: None,
            two_sided: false,
            opacity: None,
            emission: None,
        }
    }

    /// Every texture this material references, in a fixed order
    pub fn textures(&self) -> Vec<TextureId> {
        let mut out = Vec::new();
        let color = |c: &ColorParam, out: &mut Vec<TextureId>| {
            if let ColorParam::Texture(id) = c {
                out.push(*id);
            }
        };
        match &self.bsdf {
            Bsdf::Principled {
                base_color,
                metallic,
                roughness,
                ..
            } => {
                color(base_color, &mut out);
                for f in [metallic, roughness] {
                    if let FloatParam::Texture(id) = f {
                        out.push(*id);
                    }
                }
            }
            Bsdf::RoughPlastic {
                diffuse_reflectance,
                specular_reflectance,
                ..
            } => {
                color(diffuse_reflectance, &mut out);
                if let Some(s) = specular_reflectance {
                    color(s, &mut out);
                }
            }
            Bsdf::Diffuse { reflectance } => color(reflectance, &mut out),
        }
        match self.detail {
            Some(SurfaceDetail::NormalMap(id)) | Some(SurfaceDetail::BumpMap { texture: id, .. }) => {
                out.push(id)
            }
            None => {}
        }
        if let Some(FloatParam::Texture(id)) = self.opacity {
            out.push(id);
        }
        if let Some(emission) = &self.emission {
            color(emission, &mut out);
        }
        out
    }
}

/// Map one material; notes and dropped features go to `warnings`
pub fn map_material(
    index: usize,
    material: &Material,
    options: &ConvertOptions,
    warnings: &WarningSink,
) -> MappedMaterial {
    let subject = Subject::material(index, material.name.clone());
    for unsupported in &material.unsupported {
        warnings.dropped(
            Stage::Map,
            subject.clone(),
            unsupported.feature.clone(),
            format!("{} dropped: {}", unsupported.feature, unsupported.detail),
        );
    }

    let mut notes = Notes::new();
    let found = rules::RULES.iter().find_map(|rule| {
        (rule.build)(material, options.material_policy, &mut notes).map(|bsdf| (rule.rule, bsdf))
    });
    let (rule, bsdf) = match found {
        Some(found) => found,
        None => {
            warnings.dropped(
                Stage::Map,
                subject.clone(),
                "material model",
                "no diffuse or PBR parameters could be mapped; using neutral gray diffuse",
            );
            (
                MappingRule::Default,
                Bsdf::Diffuse {
                    reflectance: ColorParam::Rgb(DEFAULT_GRAY),
                },
            )
        }
    };

    let detail = surface_detail(material, &mut notes);
    let opacity = opacity(material, &mut notes);
    let emission = emission(material, &mut notes);
    let two_sided =
        (material.double_sided || options.force_two_sided) && !bsdf.is_transmissive();

    for (feature, message) in notes {
        warnings.dropped(Stage::Map, subject.clone(), feature, message);
    }

    tracing::debug!("Mapped material '{}' with rule {:?}", material.name, rule);
    MappedMaterial {
        name: material.name.clone(),
        rule,
        bsdf,
        detail,
        two_sided,
        opacity,
        emission,
    }
}

/// Map every material of the scene, in table order
pub fn map_materials(
    scene: &Scene,
    options: &ConvertOptions,
    warnings: &WarningSink,
) -> Vec<MappedMaterial> {
    let mapped: Vec<MappedMaterial> = scene
        .materials
        .par_iter()
        .enumerate()
        .map(|(index, material)| map_material(index, material, options, warnings))
        .collect();
    tracing::info!("Mapped {} materials", mapped.len());
    mapped
}

fn surface_detail(material: &Material, notes: &mut Notes) -> Option<SurfaceDetail> {
    let normal = match &material.pbr {
        Some(pbr) => {
            if pbr.normal_texture.is_some() && pbr.normal_scale != 1.0 {
                notes.push((
                    "normal scale".to_string(),
                    format!("normal texture scale {} ignored", pbr.normal_scale),
                ));
            }
            pbr.normal_texture
        }
        None => material
            .texture("normalTexture")
            .or_else(|| material.texture("norm")),
    };
    if let Some(id) = normal {
        return Some(SurfaceDetail::NormalMap(id));
    }
    material.texture("map_Bump").map(|texture| SurfaceDetail::BumpMap {
        texture,
        scale: material.scalar("map_Bump.bm").unwrap_or(1.0),
    })
}

fn opacity(material: &Material, notes: &mut Notes) -> Option<FloatParam> {
    if let AlphaMode::Mask { cutoff } = material.alpha {
        notes.push((
            "alphaCutoff".to_string(),
            format!("alpha cutoff {} approximated by fractional opacity", cutoff),
        ));
    }
    if material.alpha == AlphaMode::Opaque {
        return None;
    }

    let (factor, texture) = match (&material.pbr, material.kind) {
        (Some(pbr), _) => (pbr.base_color[3], pbr.opacity_texture),
        (None, MaterialKind::ObjMtl) => (
            crate::readers::obj::mtl_opacity(material),
            material.texture("map_d"),
        ),
        (None, MaterialKind::GltfSpecularGlossiness) => (
            material
                .params
                .get("diffuseFactor")
                .and_then(|p| match p {
                    crate::scene::Param::Vector(v) => v.get(3).copied(),
                    _ => None,
                })
                .unwrap_or(1.0),
            None,
        ),
        (None, MaterialKind::GltfMetallicRoughness) => (1.0, None),
    };
    match texture {
        Some(_) => Some(rules::float(notes, "opacity", factor, texture)),
        None if factor < 1.0 => Some(FloatParam::Value(factor)),
        None => None,
    }
}

fn emission(material: &Material, notes: &mut Notes) -> Option<ColorParam> {
    let (factor, texture) = match &material.pbr {
        Some(pbr) => (pbr.emissive, pbr.emissive_texture),
        None => match material.kind {
            MaterialKind::ObjMtl => (
                material.rgb("Ke").unwrap_or([0.0; 3]),
                material.texture("map_Ke"),
            ),
            _ => (
                material.rgb("emissiveFactor").unwrap_or([0.0; 3]),
                material.texture("emissiveTexture"),
            ),
        },
    };
    // A zero factor also turns any emissive texture black.
    if factor.iter().all(|c| *c <= 0.0) {
        return None;
    }
    Some(rules::color(notes, "emissive", factor, texture))
}
