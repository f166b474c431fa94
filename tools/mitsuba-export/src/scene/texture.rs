//! Texture references

use std::path::PathBuf;
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

/// Where a texture's pixels come from
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    /// Absolute path of an external image file
    File(PathBuf),
    /// Image bytes stored inside the source asset (GLB chunk, data URI)
    Embedded {
        bytes: Arc<Vec<u8>>,
        mime_type: Option<String>,
    },
}

impl TextureSource {
    /// Identity used for texture dedup: the path, or a hash of the bytes
    pub fn identity(&self) -> SourceIdentity {
        match self {
            TextureSource::File(path) => SourceIdentity::File(path.clone()),
            TextureSource::Embedded { bytes, .. } => {
                SourceIdentity::Embedded(xxh3_64(bytes), bytes.len())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceIdentity {
    File(PathBuf),
    Embedded(u64, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

/// What a texture feeds; decides how it is referenced in the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    BaseColor,
    Normal,
    Bump,
    Roughness,
    Metallic,
    Specular,
    Emissive,
    Opacity,
    /// Carried along but not referenced by any BSDF
    Other,
}

/// Single channel to extract, or the whole image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    All,
    R,
    G,
    B,
    A,
}

impl Channel {
    pub fn index(self) -> Option<usize> {
        match self {
            Channel::All => None,
            Channel::R => Some(0),
            Channel::G => Some(1),
            Channel::B => Some(2),
            Channel::A => Some(3),
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Channel::All => "",
            Channel::R => "_r",
            Channel::G => "_g",
            Channel::B => "_b",
            Channel::A => "_a",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureRef {
    pub name: String,
    pub source: TextureSource,
    pub color_space: ColorSpace,
    pub usage: TextureUsage,
    pub channel: Channel,
    /// Scene-relative output path (`textures/...`), set by normalization
    pub output: Option<String>,
}

impl TextureRef {
    pub fn new(
        name: impl Into<String>,
        source: TextureSource,
        color_space: ColorSpace,
        usage: TextureUsage,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            color_space,
            usage,
            channel: Channel::All,
            output: None,
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// Two refs with equal keys produce the same output file
    pub fn dedup_key(&self) -> (SourceIdentity, Channel, ColorSpace, TextureUsage) {
        (self.source.identity(), self.channel, self.color_space, self.usage)
    }

    /// Whether the scene should read this texture without sRGB decoding
    pub fn is_raw(&self) -> bool {
        self.color_space == ColorSpace::Linear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_distinguishes_channels() {
        let source = TextureSource::File(PathBuf::from("/tmp/orm.png"));
        let g = TextureRef::new("orm", source.clone(), ColorSpace::Linear, TextureUsage::Roughness)
            .with_channel(Channel::G);
        let g2 = TextureRef::new("orm2", source.clone(), ColorSpace::Linear, TextureUsage::Roughness)
            .with_channel(Channel::G);
        let b = TextureRef::new("orm", source, ColorSpace::Linear, TextureUsage::Roughness)
            .with_channel(Channel::B);
        assert_eq!(g.dedup_key(), g2.dedup_key());
        assert_ne!(g.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_embedded_identity_hashes_bytes() {
        let a = TextureSource::Embedded {
            bytes: Arc::new(vec![1, 2, 3]),
            mime_type: None,
        };
        let b = TextureSource::Embedded {
            bytes: Arc::new(vec![1, 2, 3]),
            mime_type: Some("image/png".to_string()),
        };
        assert_eq!(a.identity(), b.identity());
    }
}
