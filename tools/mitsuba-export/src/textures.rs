//! Texture export into `textures/`
//!
//! Natively loadable images are copied byte for byte. Everything else is
//! decoded with `image` and written as PNG; single-channel refs (the
//! roughness and metallic planes of a packed glTF texture, an alpha plane
//! used as opacity) become 8-bit grayscale PNGs.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat};
use mitsuba_common::layout::TEXTURE_DIR;
use rayon::prelude::*;
use serde::Serialize;

use crate::context::ConversionContext;
use crate::error::ConversionError;
use crate::normalize::{export_mode, TextureExport};
use crate::scene::{Channel, Scene, TextureId, TextureRef, TextureSource};
use crate::serialize::write_file;

/// A texture written to the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextureFileRef {
    pub texture: TextureId,
    /// Scene-relative path, e.g. `textures/wood.png`
    pub path: String,
    pub converted: bool,
    pub bytes: usize,
}

fn load(texture: &TextureRef) -> Result<DynamicImage, ConversionError> {
    let decoded = match &texture.source {
        TextureSource::File(path) => image::open(path),
        TextureSource::Embedded { bytes, .. } => image::load_from_memory(bytes),
    };
    decoded.map_err(|source| ConversionError::Texture {
        texture: texture.name.clone(),
        source,
    })
}

/// Grayscale plane of one RGBA channel
fn extract_channel(image: &DynamicImage, channel: usize) -> GrayImage {
    let rgba = image.to_rgba8();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        image::Luma([rgba.get_pixel(x, y).0[channel]])
    })
}

/// Output bytes for one texture and whether they were re-encoded
pub fn encode_texture(texture: &TextureRef) -> Result<(Vec<u8>, bool), ConversionError> {
    if export_mode(texture) == TextureExport::Copy {
        let bytes = match &texture.source {
            TextureSource::File(path) => {
                std::fs::read(path).map_err(|e| ConversionError::io(path, e))?
            }
            TextureSource::Embedded { bytes, .. } => bytes.as_ref().clone(),
        };
        return Ok((bytes, false));
    }

    let image = load(texture)?;
    let image = match texture.channel.index() {
        Some(channel) => DynamicImage::ImageLuma8(extract_channel(&image, channel)),
        None => image,
    };
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|source| ConversionError::Texture {
            texture: texture.name.clone(),
            source,
        })?;
    Ok((out.into_inner(), true))
}

/// Write every texture that has an output path, in parallel
pub fn export_textures(
    scene: &Scene,
    ctx: &ConversionContext,
) -> Result<Vec<TextureFileRef>, ConversionError> {
    if scene.textures.is_empty() {
        return Ok(Vec::new());
    }
    let dir = ctx.output_dir().join(TEXTURE_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| ConversionError::io(&dir, e))?;

    let refs = scene
        .textures
        .par_iter()
        .enumerate()
        .filter_map(|(index, texture)| {
            texture.output.as_ref().map(|path| (index, texture, path))
        })
        .map(|(index, texture, path)| {
            let (bytes, converted) = encode_texture(texture)?;
            write_file(&ctx.output_dir().join(path), &bytes)?;
            tracing::debug!(
                "Exported texture {} ({}{})",
                path,
                if converted { "converted" } else { "copied" },
                match texture.channel {
                    Channel::All => String::new(),
                    c => format!(", channel {:?}", c),
                }
            );
            Ok(TextureFileRef {
                texture: TextureId(index),
                path: path.clone(),
                converted,
                bytes: bytes.len(),
            })
        })
        .collect::<Result<Vec<_>, ConversionError>>()?;
    tracing::info!("Exported {} textures", refs.len());
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ColorSpace, TextureUsage};
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;

    fn png_bytes() -> Vec<u8> {
        let image = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 40]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn embedded(channel: Channel) -> TextureRef {
        TextureRef::new(
            "orm",
            TextureSource::Embedded {
                bytes: Arc::new(png_bytes()),
                mime_type: Some("image/png".to_string()),
            },
            ColorSpace::Linear,
            TextureUsage::Roughness,
        )
        .with_channel(channel)
    }

    #[test]
    fn test_embedded_png_copied() {
        let (bytes, converted) = encode_texture(&embedded(Channel::All)).unwrap();
        assert!(!converted);
        assert_eq!(bytes, png_bytes());
    }

    #[test]
    fn test_channel_extracted_to_gray() {
        let (bytes, converted) = encode_texture(&embedded(Channel::G)).unwrap();
        assert!(converted);
        let image = image::load_from_memory(&bytes).unwrap();
        let gray = image.as_luma8().unwrap();
        assert_eq!(gray.get_pixel(1, 1).0, [20]);
    }

    #[test]
    fn test_undecodable_texture_is_error() {
        let texture = TextureRef::new(
            "junk",
            TextureSource::Embedded {
                bytes: Arc::new(vec![1, 2, 3]),
                mime_type: None,
            },
            ColorSpace::Srgb,
            TextureUsage::BaseColor,
        );
        assert!(matches!(
            encode_texture(&texture),
            Err(ConversionError::Texture { .. })
        ));
    }
}
