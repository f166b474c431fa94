//! Shared types for the Mitsuba export pipeline
//!
//! This crate holds everything about the *target* side of a conversion that
//! does not depend on any source format:
//!
//! - [`layout`] - output directory layout and scene grammar constants
//! - [`formats`] - binary mesh formats consumed by Mitsuba (`.serialized`, `.ply`)
//!
//! The encoders here are pure: identical input always yields identical bytes.

pub mod formats;
pub mod layout;

pub use formats::{decode_mesh, FormatError, MeshBuffers, MeshView};
pub use formats::ply::{PlyHeader, PLY_COMMENT};
pub use formats::serialized::{
    SerializedHeader, SERIALIZED_MAGIC, SERIALIZED_VERSION, FLAG_COLORS, FLAG_FACE_NORMALS,
    FLAG_NORMALS, FLAG_SINGLE_PRECISION, FLAG_TEXCOORDS,
};
pub use layout::{MESH_DIR, PLY_EXT, SCENE_FILE, SCENE_VERSION, SERIALIZED_EXT, TEXTURE_DIR};
