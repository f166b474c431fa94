//! Output directory layout
//!
//! ```text
//! <output>/
//!   scene.xml
//!   meshes/<id>.serialized   (or .ply)
//!   textures/<name>.<ext>
//! ```
//!
//! Paths written into the scene file are always relative to the scene file
//! and always use `/` as separator.

/// Scene description file name
pub const SCENE_FILE: &str = "scene.xml";

/// Subdirectory holding one binary file per unique mesh
pub const MESH_DIR: &str = "meshes";

/// Subdirectory holding copied or converted textures
pub const TEXTURE_DIR: &str = "textures";

/// Scene grammar version accepted by Mitsuba 3
pub const SCENE_VERSION: &str = "3.0.0";

pub const SERIALIZED_EXT: &str = "serialized";
pub const PLY_EXT: &str = "ply";

/// Join a layout directory and a file name into a scene-relative path.
pub fn scene_relative(dir: &str, file_name: &str) -> String {
    format!("{}/{}", dir, file_name)
}

/// Image extensions Mitsuba's bitmap loader reads without conversion.
pub const NATIVE_IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "exr", "hdr", "rgbe", "pfm", "ppm", "bmp", "tga"];

/// Whether a file extension can be referenced by a `bitmap` texture as-is.
pub fn is_native_image_ext(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    NATIVE_IMAGE_EXTS.contains(&ext.as_str())
}
