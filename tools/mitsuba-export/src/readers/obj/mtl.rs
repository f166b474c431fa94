//! Wavefront MTL material libraries
//!
//! A library is parsed into [`MtlMaterial`] definitions holding resolved
//! texture paths. They only become ISG materials when a `usemtl` refers to
//! them, so unused definitions never pull textures into the output.

use std::path::{Path, PathBuf};

use super::{parse_floats, ObjBuilder};
use crate::error::ParseError;
use crate::material::units;
use crate::readers::resolve_reference;
use crate::scene::{
    AlphaMode, ColorSpace, Material, MaterialId, MaterialKind, Param, PbrParams, TextureRef,
    TextureSource, TextureUsage,
};

/// A texture statement such as `map_Kd -bm 0.5 wood.png`
#[derive(Debug, Clone, PartialEq)]
pub struct MapStatement {
    pub path: PathBuf,
    /// `-bm` bump multiplier
    pub bump_multiplier: Option<f32>,
    /// `-o`, `-s` or `-t` with a non-default value
    pub transformed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MtlMaterial {
    pub name: String,
    /// Scalar and color statements, keyed by statement name
    pub values: Vec<(String, Vec<f32>)>,
    /// Texture statements, keyed by canonical statement name
    pub maps: Vec<(String, MapStatement)>,
    /// Recognized statements without a mapping
    pub unsupported: Vec<String>,
}

impl MtlMaterial {
    fn new(name: String) -> Self {
        Self {
            name,
            values: Vec::new(),
            maps: Vec::new(),
            unsupported: Vec::new(),
        }
    }

    pub fn value(&self, key: &str) -> Option<&[f32]> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    fn has_pbr_extension(&self) -> bool {
        ["Pr", "Pm"].iter().any(|k| self.value(k).is_some())
            || self.maps.iter().any(|(k, _)| k == "map_Pr" || k == "map_Pm")
    }
}

const VALUE_KEYS: &[&str] = &["Kd", "Ks", "Ka", "Ke", "Ns", "d", "Tr", "Ni", "illum", "Pr", "Pm"];
const UNSUPPORTED_KEYS: &[&str] = &["Pc", "Pcr", "Ps", "aniso", "anisor"];

/// Texture statement name to its canonical key
fn map_key(keyword: &str) -> Option<&'static str> {
    Some(match keyword {
        "map_Kd" => "map_Kd",
        "map_Ks" => "map_Ks",
        "map_Ns" => "map_Ns",
        "map_d" => "map_d",
        "map_Bump" | "map_bump" | "bump" => "map_Bump",
        "norm" | "map_norm" => "norm",
        "map_Ke" => "map_Ke",
        "map_Pr" => "map_Pr",
        "map_Pm" => "map_Pm",
        "map_Ka" => "map_Ka",
        "disp" => "disp",
        "refl" => "refl",
        _ => return None,
    })
}

/// Parse an MTL library; texture paths resolve relative to the library
pub fn parse_mtl(path: &Path, source: &str) -> Result<Vec<MtlMaterial>, ParseError> {
    let mut materials: Vec<MtlMaterial> = Vec::new();

    for (number, line) in source.lines().enumerate() {
        let line_no = number + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .unwrap_or((line, ""));
        let err = |reason: String| ParseError::new(path, reason).at_line(line_no);

        if keyword == "newmtl" {
            if rest.is_empty() {
                return Err(err("newmtl without a name".to_string()));
            }
            materials.push(MtlMaterial::new(rest.to_string()));
            continue;
        }

        let Some(current) = materials.last_mut() else {
            return Err(err(format!("'{}' before any newmtl", keyword)));
        };

        if let Some(key) = VALUE_KEYS.iter().find(|k| **k == keyword) {
            let values = parse_floats(rest.split_whitespace())
                .map_err(|token| err(format!("invalid number '{}' in {}", token, keyword)))?;
            let expected = match *key {
                "Kd" | "Ks" | "Ka" | "Ke" => 1..=3,
                _ => 1..=1,
            };
            if !expected.contains(&values.len()) {
                return Err(err(format!(
                    "{} expects {} value(s), got {}",
                    keyword,
                    expected.end(),
                    values.len()
                )));
            }
            let values = if values.len() == 1 && expected.end() == &3 {
                vec![values[0]; 3]
            } else {
                values
            };
            current.values.push((key.to_string(), values));
        } else if let Some(key) = map_key(keyword) {
            let statement = parse_map_statement(rest).map_err(err)?;
            let resolved =
                resolve_reference(path, &statement.0).map_err(|e| e.at_line(line_no))?;
            current.maps.push((
                key.to_string(),
                MapStatement {
                    path: resolved,
                    bump_multiplier: statement.1,
                    transformed: statement.2,
                },
            ));
        } else if UNSUPPORTED_KEYS.contains(&keyword) {
            if !current.unsupported.iter().any(|k| k == keyword) {
                current.unsupported.push(keyword.to_string());
            }
        } else {
            tracing::debug!("{:?} line {}: ignoring '{}'", path, line_no, keyword);
        }
    }

    Ok(materials)
}

/// Split texture options from the file name: `(file, -bm, transformed)`
fn parse_map_statement(rest: &str) -> Result<(String, Option<f32>, bool), String> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let mut bump_multiplier = None;
    let mut transformed = false;
    let mut i = 0;

    while i < tokens.len() && tokens[i].starts_with('-') {
        let option = tokens[i];
        let arity = match option {
            "-o" | "-s" | "-t" => 3,
            "-mm" => 2,
            "-bm" | "-blendu" | "-blendv" | "-boost" | "-cc" | "-clamp" | "-imfchan"
            | "-texres" | "-type" => 1,
            other => return Err(format!("unknown texture option '{}'", other)),
        };
        i += 1;
        let mut args = Vec::new();
        // -o/-s/-t take 1 to 3 numbers
        while args.len() < arity && i < tokens.len() {
            if arity == 3 && tokens[i].parse::<f32>().is_err() {
                break;
            }
            args.push(tokens[i]);
            i += 1;
        }
        if args.is_empty() {
            return Err(format!("texture option '{}' is missing its value", option));
        }
        match option {
            "-bm" => {
                let value = args[0]
                    .parse::<f32>()
                    .map_err(|_| format!("invalid bump multiplier '{}'", args[0]))?;
                bump_multiplier = Some(value);
            }
            "-o" | "-t" => {
                transformed |= args.iter().any(|a| a.parse::<f32>().ok() != Some(0.0));
            }
            "-s" => {
                transformed |= args.iter().any(|a| a.parse::<f32>().ok() != Some(1.0));
            }
            _ => {}
        }
    }

    if i >= tokens.len() {
        return Err("texture statement without a file name".to_string());
    }
    Ok((tokens[i..].join(" "), bump_multiplier, transformed))
}

impl ObjBuilder<'_> {
    /// ISG material for a library definition, created on first use
    pub(super) fn material(&mut self, name: &str) -> Option<MaterialId> {
        if let Some(&id) = self.material_ids.get(name) {
            return Some(id);
        }
        let def = self.library.iter().rev().find(|m| m.name == name)?.clone();
        let material = self.build_material(&def);
        let id = self.scene.add_material(material);
        self.material_ids.insert(name.to_string(), id);
        Some(id)
    }

    fn build_material(&mut self, def: &MtlMaterial) -> Material {
        let mut material = Material::new(def.name.clone(), MaterialKind::ObjMtl);
        // OBJ has no culling convention; surfaces are visible from both sides.
        material.double_sided = true;

        for (key, values) in &def.values {
            let param = match values.as_slice() {
                [v] => Param::Scalar(*v),
                many => Param::Vector(many.to_vec()),
            };
            material.set(key.clone(), param);
        }

        for (key, map) in &def.maps {
            let (usage, color_space) = match key.as_str() {
                "map_Kd" => (TextureUsage::BaseColor, ColorSpace::Srgb),
                "map_Ks" => (TextureUsage::Specular, ColorSpace::Srgb),
                "map_Ke" => (TextureUsage::Emissive, ColorSpace::Srgb),
                "map_d" => (TextureUsage::Opacity, ColorSpace::Linear),
                "map_Bump" => (TextureUsage::Bump, ColorSpace::Linear),
                "norm" => (TextureUsage::Normal, ColorSpace::Linear),
                "map_Pr" => (TextureUsage::Roughness, ColorSpace::Linear),
                "map_Pm" => (TextureUsage::Metallic, ColorSpace::Linear),
                "map_Ns" => {
                    material.mark_unsupported("map_Ns", "specular exponent texture ignored");
                    continue;
                }
                other => {
                    material.mark_unsupported(other, "texture slot has no scene equivalent");
                    continue;
                }
            };
            if map.transformed {
                material.mark_unsupported(
                    format!("{} transform", key),
                    "texture offset/scale/turbulence options ignored",
                );
            }
            if let Some(bm) = map.bump_multiplier {
                material.set(format!("{}.bm", key), Param::Scalar(bm));
            }
            let name = crate::readers::stem_or(&map.path, "texture");
            let texture = TextureRef::new(
                name,
                TextureSource::File(map.path.clone()),
                color_space,
                usage,
            );
            let id = self.scene.add_texture(texture);
            material.set(key.clone(), Param::Texture(id));
        }

        for key in &def.unsupported {
            let detail = match key.as_str() {
                "Pc" | "Pcr" => "clearcoat ignored",
                "Ps" => "sheen ignored",
                _ => "anisotropy ignored",
            };
            material.mark_unsupported(key.clone(), detail);
        }

        if mtl_opacity(&material) < 1.0 || material.texture("map_d").is_some() {
            material.alpha = AlphaMode::Blend;
        }
        if def.has_pbr_extension() {
            material.pbr = Some(pbr_from_mtl(&material));
        }
        material
    }
}

/// Metallic-roughness view of an MTL using the `Pr`/`Pm` extension.
///
/// A scalar missing next to its texture is neutral (1), so the texture
/// carries the value alone.
fn pbr_from_mtl(material: &Material) -> PbrParams {
    let neutral = |texture: &str, default: f32| {
        if material.texture(texture).is_some() {
            1.0
        } else {
            default
        }
    };
    let kd = material
        .rgb("Kd")
        .unwrap_or([neutral("map_Kd", 0.8); 3]);
    PbrParams {
        base_color: [kd[0], kd[1], kd[2], mtl_opacity(material)],
        base_color_texture: material.texture("map_Kd"),
        metallic: material.scalar("Pm").unwrap_or(neutral("map_Pm", 0.0)),
        roughness: material
            .scalar("Pr")
            .or_else(|| {
                material
                    .scalar("Ns")
                    .map(|ns| units::alpha_to_roughness(units::ns_to_alpha(ns)))
            })
            .unwrap_or(neutral("map_Pr", 0.5)),
        metallic_texture: material.texture("map_Pm"),
        roughness_texture: material.texture("map_Pr"),
        normal_texture: material.texture("norm"),
        normal_scale: 1.0,
        emissive: material
            .rgb("Ke")
            .unwrap_or([neutral("map_Ke", 0.0); 3]),
        emissive_texture: material.texture("map_Ke"),
        opacity_texture: material.texture("map_d"),
        ior: material.scalar("Ni"),
        transmission: 0.0,
    }
}

/// `d`, else `1 - Tr`, else opaque
pub fn mtl_opacity(material: &Material) -> f32 {
    material
        .scalar("d")
        .or_else(|| material.scalar("Tr").map(units::transparency_to_opacity))
        .unwrap_or(1.0)
}
