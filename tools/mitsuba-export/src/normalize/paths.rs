//! Output paths for textures

use mitsuba_common::layout::{is_native_image_ext, scene_relative, TEXTURE_DIR};

use crate::naming::IdAllocator;
use crate::scene::{Channel, TextureRef, TextureSource};

/// How a texture reaches `textures/`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureExport {
    /// Source bytes are written unchanged
    Copy,
    /// Decoded and re-encoded as PNG, extracting a channel if requested
    ConvertToPng,
}

/// Extension Mitsuba can load for an embedded image's MIME type
fn mime_extension(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/bmp" => Some("bmp"),
        "image/x-tga" | "image/tga" => Some("tga"),
        "image/vnd.radiance" => Some("hdr"),
        "image/x-exr" => Some("exr"),
        _ => None,
    }
}

/// Native extension of a texture's source, if it can be copied as-is
fn native_extension(texture: &TextureRef) -> Option<String> {
    match &texture.source {
        TextureSource::File(path) => path
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| is_native_image_ext(e))
            .map(|e| e.to_ascii_lowercase()),
        TextureSource::Embedded { bytes, mime_type } => mime_type
            .as_deref()
            .and_then(mime_extension)
            .or_else(|| match image::guess_format(bytes) {
                Ok(image::ImageFormat::Png) => Some("png"),
                Ok(image::ImageFormat::Jpeg) => Some("jpg"),
                Ok(image::ImageFormat::Bmp) => Some("bmp"),
                Ok(image::ImageFormat::Hdr) => Some("hdr"),
                _ => None,
            })
            .map(str::to_string),
    }
}

/// Decide whether a texture is copied or converted
pub fn export_mode(texture: &TextureRef) -> TextureExport {
    if texture.channel == Channel::All && native_extension(texture).is_some() {
        TextureExport::Copy
    } else {
        TextureExport::ConvertToPng
    }
}

/// Set `output` on every texture, in table order.
///
/// Names come from the texture name plus its channel suffix; collisions get
/// `_1`, `_2`, ... Only the names and sources are read, so reassigning
/// produces the same paths.
pub fn assign_texture_paths(textures: &mut [TextureRef]) {
    let mut names = IdAllocator::new();
    for texture in textures.iter_mut() {
        let ext = match export_mode(texture) {
            TextureExport::Copy => native_extension(texture).unwrap_or_else(|| "png".to_string()),
            TextureExport::ConvertToPng => "png".to_string(),
        };
        let base = format!("{}{}", texture.name, texture.channel.suffix());
        let stem = names.allocate(&base, "texture");
        texture.output = Some(scene_relative(TEXTURE_DIR, &format!("{}.{}", stem, ext)));
    }
}
