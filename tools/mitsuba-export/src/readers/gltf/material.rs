//! glTF materials and textures

use std::sync::Arc;

use base64::Engine;
use serde_json::Value;

use super::{f32_field, vec_field, SceneBuilder};
use crate::error::ParseError;
use crate::readers::{resolve_reference, stem_or};
use crate::scene::{
    AlphaMode, Channel, ColorSpace, Material, MaterialId, MaterialKind, Param, PbrParams,
    TextureId, TextureRef, TextureSource, TextureUsage,
};

/// Human-readable name of a material extension we do not map
fn describe_extension(name: &str) -> &'static str {
    match name {
        "KHR_materials_clearcoat" => "clearcoat layer",
        "KHR_materials_sheen" => "sheen layer",
        "KHR_materials_specular" => "specular strength and color",
        "KHR_materials_volume" => "volume attenuation",
        "KHR_materials_iridescence" => "thin-film iridescence",
        "KHR_materials_anisotropy" => "anisotropic roughness",
        "KHR_materials_dispersion" => "dispersion",
        "KHR_materials_unlit" => "unlit shading",
        "KHR_materials_variants" => "material variants",
        _ => "material extension",
    }
}

/// Texture info objects inside a raw material, by JSON pointer
const TEXTURE_INFO_POINTERS: &[&str] = &[
    "/pbrMetallicRoughness/baseColorTexture",
    "/pbrMetallicRoughness/metallicRoughnessTexture",
    "/normalTexture",
    "/occlusionTexture",
    "/emissiveTexture",
    "/extensions/KHR_materials_pbrSpecularGlossiness/diffuseTexture",
    "/extensions/KHR_materials_pbrSpecularGlossiness/specularGlossinessTexture",
];

impl SceneBuilder<'_> {
    /// ISG material for a glTF material index, created once
    pub(super) fn material(&mut self, index: usize) -> Result<MaterialId, ParseError> {
        if let Some(&id) = self.materials.get(&index) {
            return Ok(id);
        }
        let document = self.document;
        let raw = self.raw;
        let material = document.materials().nth(index).ok_or_else(|| {
            ParseError::new(self.path, format!("material {} does not exist", index))
        })?;
        let raw_material = &raw["materials"][index];
        let extensions = &raw_material["extensions"];

        let name = material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material{}", index));

        let spec_gloss = &extensions["KHR_materials_pbrSpecularGlossiness"];
        let mut isg = if spec_gloss.is_object() {
            self.specular_glossiness(name, &material, spec_gloss)?
        } else {
            self.metallic_roughness(name, &material)?
        };

        isg.double_sided = material.double_sided();
        isg.alpha = match material.alpha_mode() {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask {
                cutoff: material.alpha_cutoff().unwrap_or(0.5),
            },
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        };

        if isg.alpha != AlphaMode::Opaque {
            if let Some(info) = material.pbr_metallic_roughness().base_color_texture() {
                let opacity = self.texture(
                    info.texture(),
                    TextureUsage::Opacity,
                    ColorSpace::Linear,
                    Channel::A,
                )?;
                if let Some(pbr) = &mut isg.pbr {
                    pbr.opacity_texture = Some(opacity);
                }
            }
        }

        if let Some(map) = extensions.as_object() {
            for (ext, value) in map {
                apply_extension(&mut isg, ext, value);
            }
        }

        for pointer in TEXTURE_INFO_POINTERS {
            let Some(info) = raw_material.pointer(pointer) else {
                continue;
            };
            if info["extensions"]["KHR_texture_transform"].is_object() {
                isg.mark_unsupported(
                    "KHR_texture_transform",
                    "texture coordinate transforms are ignored",
                );
            }
            if info["texCoord"].as_u64().unwrap_or(0) > 0 {
                isg.mark_unsupported(
                    "texCoord",
                    "textures bound to a UV set other than 0 are sampled with set 0",
                );
            }
        }

        let id = self.scene.add_material(isg);
        self.materials.insert(index, id);
        Ok(id)
    }

    fn metallic_roughness(
        &mut self,
        name: String,
        material: &gltf::Material<'_>,
    ) -> Result<Material, ParseError> {
        let source = material.pbr_metallic_roughness();
        let mut isg = Material::new(name, MaterialKind::GltfMetallicRoughness);
        isg.set(
            "baseColorFactor",
            Param::Vector(source.base_color_factor().to_vec()),
        );
        isg.set("metallicFactor", Param::Scalar(source.metallic_factor()));
        isg.set("roughnessFactor", Param::Scalar(source.roughness_factor()));
        isg.set(
            "emissiveFactor",
            Param::Vector(material.emissive_factor().to_vec()),
        );

        let mut pbr = PbrParams {
            base_color: source.base_color_factor(),
            metallic: source.metallic_factor(),
            roughness: source.roughness_factor(),
            emissive: material.emissive_factor(),
            ..Default::default()
        };

        if let Some(info) = source.base_color_texture() {
            pbr.base_color_texture = Some(self.texture(
                info.texture(),
                TextureUsage::BaseColor,
                ColorSpace::Srgb,
                Channel::All,
            )?);
        }
        if let Some(info) = source.metallic_roughness_texture() {
            pbr.roughness_texture = Some(self.texture(
                info.texture(),
                TextureUsage::Roughness,
                ColorSpace::Linear,
                Channel::G,
            )?);
            pbr.metallic_texture = Some(self.texture(
                info.texture(),
                TextureUsage::Metallic,
                ColorSpace::Linear,
                Channel::B,
            )?);
        }
        if let Some(normal) = material.normal_texture() {
            pbr.normal_scale = normal.scale();
            pbr.normal_texture = Some(self.texture(
                normal.texture(),
                TextureUsage::Normal,
                ColorSpace::Linear,
                Channel::All,
            )?);
        }
        if let Some(info) = material.emissive_texture() {
            pbr.emissive_texture = Some(self.texture(
                info.texture(),
                TextureUsage::Emissive,
                ColorSpace::Srgb,
                Channel::All,
            )?);
        }

        isg.pbr = Some(pbr);
        Ok(isg)
    }

    fn specular_glossiness(
        &mut self,
        name: String,
        material: &gltf::Material<'_>,
        ext: &Value,
    ) -> Result<Material, ParseError> {
        let mut isg = Material::new(name, MaterialKind::GltfSpecularGlossiness);
        let diffuse = vec_field::<4>(ext, "diffuseFactor").unwrap_or([1.0; 4]);
        let specular = vec_field::<3>(ext, "specularFactor").unwrap_or([1.0; 3]);
        let glossiness = f32_field(ext, "glossinessFactor").unwrap_or(1.0);
        isg.set("diffuseFactor", Param::Vector(diffuse.to_vec()));
        isg.set("specularFactor", Param::Vector(specular.to_vec()));
        isg.set("glossinessFactor", Param::Scalar(glossiness));
        isg.set(
            "emissiveFactor",
            Param::Vector(material.emissive_factor().to_vec()),
        );

        if let Some(id) = self.json_texture(
            &ext["diffuseTexture"],
            TextureUsage::BaseColor,
            ColorSpace::Srgb,
        )? {
            isg.set("diffuseTexture", Param::Texture(id));
        }
        if let Some(id) = self.json_texture(
            &ext["specularGlossinessTexture"],
            TextureUsage::Specular,
            ColorSpace::Srgb,
        )? {
            isg.set("specularGlossinessTexture", Param::Texture(id));
        }
        if let Some(normal) = material.normal_texture() {
            let id = self.texture(
                normal.texture(),
                TextureUsage::Normal,
                ColorSpace::Linear,
                Channel::All,
            )?;
            isg.set("normalTexture", Param::Texture(id));
        }
        if let Some(info) = material.emissive_texture() {
            let id = self.texture(
                info.texture(),
                TextureUsage::Emissive,
                ColorSpace::Srgb,
                Channel::All,
            )?;
            isg.set("emissiveTexture", Param::Texture(id));
        }
        Ok(isg)
    }

    /// Texture referenced from extension JSON by `{"index": N}`
    fn json_texture(
        &mut self,
        info: &Value,
        usage: TextureUsage,
        color_space: ColorSpace,
    ) -> Result<Option<TextureId>, ParseError> {
        let Some(index) = info["index"].as_u64() else {
            return Ok(None);
        };
        let document = self.document;
        let texture = document.textures().nth(index as usize).ok_or_else(|| {
            ParseError::new(self.path, format!("texture {} does not exist", index))
        })?;
        self.texture(texture, usage, color_space, Channel::All).map(Some)
    }

    /// ISG texture ref for a glTF texture, usage, and channel, created once
    fn texture(
        &mut self,
        texture: gltf::Texture<'_>,
        usage: TextureUsage,
        color_space: ColorSpace,
        channel: Channel,
    ) -> Result<TextureId, ParseError> {
        let key = (texture.index(), channel, usage);
        if let Some(&id) = self.textures.get(&key) {
            return Ok(id);
        }

        let image = texture.source();
        let source = self.image_source(&image)?;
        let name = image
            .name()
            .or_else(|| texture.name())
            .map(str::to_string)
            .unwrap_or_else(|| match &source {
                TextureSource::File(path) => stem_or(path, "texture"),
                TextureSource::Embedded { .. } => format!("image{}", image.index()),
            });

        let texture_ref = TextureRef::new(name, source, color_space, usage).with_channel(channel);
        let id = self.scene.add_texture(texture_ref);
        self.textures.insert(key, id);
        Ok(id)
    }

    fn image_source(&mut self, image: &gltf::Image<'_>) -> Result<TextureSource, ParseError> {
        if let Some(source) = self.images.get(&image.index()) {
            return Ok(source.clone());
        }

        let source = match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let data = &self.buffers[view.buffer().index()];
                let bytes = data
                    .get(view.offset()..view.offset() + view.length())
                    .ok_or_else(|| {
                        ParseError::new(
                            self.path,
                            format!("image {} buffer view is out of bounds", image.index()),
                        )
                    })?;
                TextureSource::Embedded {
                    bytes: Arc::new(bytes.to_vec()),
                    mime_type: Some(mime_type.to_string()),
                }
            }
            gltf::image::Source::Uri { uri, mime_type } => match uri.strip_prefix("data:") {
                Some(data_uri) => {
                    let (mime, bytes) = decode_data_uri(data_uri).map_err(|reason| {
                        ParseError::new(
                            self.path,
                            format!("image {}: {}", image.index(), reason),
                        )
                    })?;
                    TextureSource::Embedded {
                        bytes: Arc::new(bytes),
                        mime_type: mime_type.map(str::to_string).or(mime),
                    }
                }
                None => TextureSource::File(resolve_reference(self.path, uri)?),
            },
        };

        self.images.insert(image.index(), source.clone());
        Ok(source)
    }
}

/// Apply one entry of a material's `extensions` object
fn apply_extension(material: &mut Material, ext: &str, value: &Value) {
    match ext {
        "KHR_materials_pbrSpecularGlossiness" => {}
        "KHR_materials_emissive_strength" => {
            let strength = f32_field(value, "emissiveStrength").unwrap_or(1.0);
            material.set("emissiveStrength", Param::Scalar(strength));
            if let Some(pbr) = &mut material.pbr {
                pbr.emissive = pbr.emissive.map(|c| c * strength);
            }
        }
        "KHR_materials_ior" => {
            let ior = f32_field(value, "ior").unwrap_or(1.5);
            material.set("ior", Param::Scalar(ior));
            if let Some(pbr) = &mut material.pbr {
                pbr.ior = Some(ior);
            }
        }
        "KHR_materials_transmission" => {
            let factor = f32_field(value, "transmissionFactor").unwrap_or(0.0);
            material.set("transmissionFactor", Param::Scalar(factor));
            if let Some(pbr) = &mut material.pbr {
                pbr.transmission = factor;
            }
            if value["transmissionTexture"].is_object() {
                material.mark_unsupported(
                    "KHR_materials_transmission.texture",
                    "transmission texture ignored, factor used",
                );
            }
        }
        other => material.mark_unsupported(other, describe_extension(other)),
    }
}

/// Split `mime;base64,payload` (after the `data:` prefix) and decode it
fn decode_data_uri(rest: &str) -> Result<(Option<String>, Vec<u8>), String> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "malformed data URI".to_string())?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| "only base64 data URIs are supported".to_string())?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| format!("invalid base64 payload: {}", e))?;
    let mime = (!mime.is_empty()).then(|| mime.to_string());
    Ok((mime, bytes))
}
