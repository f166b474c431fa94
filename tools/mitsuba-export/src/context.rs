//! Conversion configuration
//!
//! Options can come from a TOML file and/or CLI flags. Every field has a
//! default, so an empty file is a valid configuration:
//!
//! ```toml
//! obj_up_axis = "z"
//! flip_uv = false
//! hierarchy = "nested"
//! mesh_format = "ply"
//!
//! [render]
//! sample_count = 128
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mitsuba_common::{formats, FormatError, MeshView, PLY_EXT, SERIALIZED_EXT};
use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

/// Up axis of a coordinate convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpAxis {
    #[default]
    Y,
    Z,
}

impl FromStr for UpAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "y" => Ok(UpAxis::Y),
            "z" => Ok(UpAxis::Z),
            other => Err(format!("unknown up axis '{}', expected 'y' or 'z'", other)),
        }
    }
}

/// How node transforms reach the scene file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyMode {
    /// Every shape carries a single world-space matrix
    #[default]
    Flatten,
    /// Every shape carries its node's local matrix followed by each ancestor's
    Nested,
}

impl FromStr for HierarchyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flatten" | "flat" => Ok(HierarchyMode::Flatten),
            "nested" => Ok(HierarchyMode::Nested),
            other => Err(format!(
                "unknown hierarchy mode '{}', expected 'flatten' or 'nested'",
                other
            )),
        }
    }
}

/// Binary mesh format for files under `meshes/`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    #[default]
    Serialized,
    Ply,
}

impl MeshFormat {
    pub fn extension(self) -> &'static str {
        match self {
            MeshFormat::Serialized => SERIALIZED_EXT,
            MeshFormat::Ply => PLY_EXT,
        }
    }

    /// `type` attribute of the `<shape>` element loading this format
    pub fn shape_type(self) -> &'static str {
        match self {
            MeshFormat::Serialized => "serialized",
            MeshFormat::Ply => "ply",
        }
    }

    pub fn encode(self, mesh: &MeshView<'_>) -> Result<Vec<u8>, FormatError> {
        match self {
            MeshFormat::Serialized => formats::serialized::encode(mesh),
            MeshFormat::Ply => formats::ply::encode(mesh),
        }
    }
}

impl FromStr for MeshFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serialized" => Ok(MeshFormat::Serialized),
            "ply" => Ok(MeshFormat::Ply),
            other => Err(format!(
                "unknown mesh format '{}', expected 'serialized' or 'ply'",
                other
            )),
        }
    }
}

/// Which BSDF models the material mapper may select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaterialPolicy {
    /// principled, then roughplastic, then diffuse
    #[default]
    Principled,
    /// Everything becomes `diffuse`
    DiffuseOnly,
}

impl FromStr for MaterialPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "principled" => Ok(MaterialPolicy::Principled),
            "diffuse-only" | "diffuse" => Ok(MaterialPolicy::DiffuseOnly),
            other => Err(format!(
                "unknown material policy '{}', expected 'principled' or 'diffuse-only'",
                other
            )),
        }
    }
}

impl fmt::Display for MaterialPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialPolicy::Principled => write!(f, "principled"),
            MaterialPolicy::DiffuseOnly => write!(f, "diffuse-only"),
        }
    }
}

/// Integrator, sampler, and film settings for the emitted scene
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderDefaults {
    pub max_depth: u32,
    pub sample_count: u32,
    pub width: u32,
    pub height: u32,
    /// Vertical field of view (degrees) of the sensor made when the source has no camera
    pub fov: f32,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            max_depth: 3,
            sample_count: 32,
            width: 512,
            height: 512,
            fov: 45.0,
        }
    }
}

/// All knobs of one conversion
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Up axis assumed for OBJ files, which carry no convention of their own
    pub obj_up_axis: UpAxis,
    /// Up axis of the emitted scene
    pub target_up_axis: UpAxis,
    /// Mirror the scene along its depth axis, switching handedness
    pub flip_handedness: bool,
    /// Emit UVs with a bottom-left origin instead of Mitsuba's top-left
    pub flip_uv: bool,
    /// Wrap every opaque BSDF in `twosided`
    pub force_two_sided: bool,
    /// Vertex dedup quantization step; 0 means exact bit equality
    pub dedup_epsilon: f32,
    pub hierarchy: HierarchyMode,
    pub mesh_format: MeshFormat,
    pub material_policy: MaterialPolicy,
    /// Multiplier applied after the photometric to radiometric conversion of lights
    pub light_intensity_scale: f32,
    pub render: RenderDefaults,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            obj_up_axis: UpAxis::Y,
            target_up_axis: UpAxis::Y,
            flip_handedness: false,
            flip_uv: false,
            force_two_sided: false,
            dedup_epsilon: 0.0,
            hierarchy: HierarchyMode::Flatten,
            mesh_format: MeshFormat::Serialized,
            material_policy: MaterialPolicy::Principled,
            light_intensity_scale: 1.0,
            render: RenderDefaults::default(),
        }
    }
}

impl ConvertOptions {
    /// Parse options from TOML
    pub fn from_toml_str(source: &str) -> Result<Self, ConversionError> {
        let options: Self =
            toml::from_str(source).map_err(|e| ConversionError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConversionError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConversionError::io(path, e))?;
        Self::from_toml_str(&source)
            .map_err(|e| ConversionError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), ConversionError> {
        if !self.dedup_epsilon.is_finite() || self.dedup_epsilon < 0.0 {
            return Err(ConversionError::Config(format!(
                "dedup_epsilon must be a non-negative number, got {}",
                self.dedup_epsilon
            )));
        }
        if !self.light_intensity_scale.is_finite() || self.light_intensity_scale < 0.0 {
            return Err(ConversionError::Config(format!(
                "light_intensity_scale must be a non-negative number, got {}",
                self.light_intensity_scale
            )));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ConversionError::Config(
                "render width and height must be non-zero".to_string(),
            ));
        }
        if !(self.render.fov > 0.0 && self.render.fov < 180.0) {
            return Err(ConversionError::Config(format!(
                "render fov must be in (0, 180), got {}",
                self.render.fov
            )));
        }
        Ok(())
    }
}

/// Immutable per-invocation state shared by every stage
#[derive(Debug, Clone)]
pub struct ConversionContext {
    output_dir: PathBuf,
    options: ConvertOptions,
}

impl ConversionContext {
    pub fn new(output_dir: impl Into<PathBuf>, options: ConvertOptions) -> Result<Self, ConversionError> {
        options.validate()?;
        Ok(Self {
            output_dir: output_dir.into(),
            options,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }
}
