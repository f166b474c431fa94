//! Priority-ordered BSDF selection
//!
//! Each [`Rule`] inspects a source material and either builds a base BSDF or
//! passes. The first rule that builds wins; [`RULES`] is ordered from the
//! most to the least faithful model. A new source material kind adds its
//! own rules here instead of branching inside existing ones.

use super::{units, Bsdf, ColorParam, FloatParam, MappingRule, Notes};
use crate::context::MaterialPolicy;
use crate::scene::{Material, MaterialKind, TextureId};

pub(super) struct Rule {
    pub rule: MappingRule,
    pub build: fn(&Material, MaterialPolicy, &mut Notes) -> Option<Bsdf>,
}

pub(super) const RULES: &[Rule] = &[
    Rule {
        rule: MappingRule::Principled,
        build: principled,
    },
    Rule {
        rule: MappingRule::RoughPlastic,
        build: specular_glossiness_plastic,
    },
    Rule {
        rule: MappingRule::RoughPlastic,
        build: mtl_plastic,
    },
    Rule {
        rule: MappingRule::Diffuse,
        build: diffuse,
    },
];

/// Texture wins over factor; a non-neutral factor next to a texture is noted
pub(super) fn color(
    notes: &mut Notes,
    name: &str,
    factor: [f32; 3],
    texture: Option<TextureId>,
) -> ColorParam {
    match texture {
        Some(id) => {
            if factor != [1.0; 3] {
                notes.push((
                    format!("{} factor", name),
                    format!(
                        "{} factor {:?} not applied on top of its texture",
                        name, factor
                    ),
                ));
            }
            ColorParam::Texture(id)
        }
        None => ColorParam::Rgb(factor),
    }
}

pub(super) fn float(
    notes: &mut Notes,
    name: &str,
    factor: f32,
    texture: Option<TextureId>,
) -> FloatParam {
    match texture {
        Some(id) => {
            if factor != 1.0 {
                notes.push((
                    format!("{} factor", name),
                    format!("{} factor {} not applied on top of its texture", name, factor),
                ));
            }
            FloatParam::Texture(id)
        }
        None => FloatParam::Value(factor),
    }
}

fn rgb3(v: [f32; 4]) -> [f32; 3] {
    [v[0], v[1], v[2]]
}

/// Metallic-roughness subset present
fn principled(material: &Material, policy: MaterialPolicy, notes: &mut Notes) -> Option<Bsdf> {
    if policy != MaterialPolicy::Principled {
        return None;
    }
    let pbr = material.pbr.as_ref()?;
    Some(Bsdf::Principled {
        base_color: color(notes, "base color", rgb3(pbr.base_color), pbr.base_color_texture),
        metallic: float(notes, "metallic", pbr.metallic, pbr.metallic_texture),
        roughness: float(notes, "roughness", pbr.roughness, pbr.roughness_texture),
        eta: pbr.ior,
        spec_trans: pbr.transmission,
    })
}

/// glTF specular-glossiness as a rough plastic
fn specular_glossiness_plastic(
    material: &Material,
    policy: MaterialPolicy,
    notes: &mut Notes,
) -> Option<Bsdf> {
    if policy != MaterialPolicy::Principled || material.kind != MaterialKind::GltfSpecularGlossiness
    {
        return None;
    }
    let diffuse = material.rgb("diffuseFactor").unwrap_or([1.0; 3]);
    let specular = material.rgb("specularFactor").unwrap_or([1.0; 3]);
    let glossiness = material.scalar("glossinessFactor").unwrap_or(1.0);
    let spec_texture = material.texture("specularGlossinessTexture");
    if spec_texture.is_some() {
        notes.push((
            "specularGlossinessTexture.alpha".to_string(),
            "glossiness channel of specularGlossinessTexture ignored, glossinessFactor used"
                .to_string(),
        ));
    }
    Some(Bsdf::RoughPlastic {
        diffuse_reflectance: color(notes, "diffuse", diffuse, material.texture("diffuseTexture")),
        specular_reflectance: Some(color(notes, "specular", specular, spec_texture)),
        alpha: units::roughness_to_alpha(units::glossiness_to_roughness(glossiness)),
        int_ior: 1.5,
    })
}

/// Classic MTL with a specular lobe (`Ks` or `map_Ks`, illum >= 2)
fn mtl_plastic(material: &Material, policy: MaterialPolicy, notes: &mut Notes) -> Option<Bsdf> {
    if policy != MaterialPolicy::Principled || material.kind != MaterialKind::ObjMtl {
        return None;
    }
    if matches!(material.scalar("illum"), Some(i) if i < 2.0) {
        return None;
    }
    let ks_texture = material.texture("map_Ks");
    let ks = material.rgb("Ks");
    let has_specular = ks_texture.is_some() || ks.is_some_and(|ks| ks.iter().any(|c| *c > 0.0));
    if !has_specular {
        return None;
    }
    let kd_texture = material.texture("map_Kd");
    let kd = material
        .rgb("Kd")
        .unwrap_or(if kd_texture.is_some() { [1.0; 3] } else { [0.8; 3] });
    let ks = ks.unwrap_or([1.0; 3]);
    let int_ior = material.scalar("Ni").filter(|ni| *ni > 1.0).unwrap_or(1.5);
    Some(Bsdf::RoughPlastic {
        diffuse_reflectance: color(notes, "Kd", kd, kd_texture),
        specular_reflectance: Some(color(notes, "Ks", ks, ks_texture)),
        alpha: units::ns_to_alpha(material.scalar("Ns").unwrap_or(0.0)),
        int_ior,
    })
}

/// Anything with a diffuse color
fn diffuse(material: &Material, _policy: MaterialPolicy, notes: &mut Notes) -> Option<Bsdf> {
    let reflectance = if let Some(pbr) = &material.pbr {
        color(notes, "base color", rgb3(pbr.base_color), pbr.base_color_texture)
    } else {
        let (key, texture_key) = match material.kind {
            MaterialKind::ObjMtl => ("Kd", "map_Kd"),
            MaterialKind::GltfSpecularGlossiness => ("diffuseFactor", "diffuseTexture"),
            MaterialKind::GltfMetallicRoughness => ("baseColorFactor", "baseColorTexture"),
        };
        let texture = material.texture(texture_key);
        let factor = material.rgb(key);
        if factor.is_none() && texture.is_none() {
            return None;
        }
        color(notes, key, factor.unwrap_or([1.0; 3]), texture)
    };
    Some(Bsdf::Diffuse { reflectance })
}
