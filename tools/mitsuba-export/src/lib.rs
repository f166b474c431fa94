//! mitsuba-export library
//!
//! Converts glTF/GLB and OBJ/MTL assets into Mitsuba 3 scenes: a
//! `scene.xml`, one binary mesh per unique mesh under `meshes/`, and the
//! referenced images under `textures/`.
//!
//! The entry point is [`convert`]; the stages it runs are public for tools
//! that need only part of the pipeline.

pub mod context;
pub mod diagnostics;
pub mod driver;
pub mod emit;
pub mod error;
pub mod material;
pub mod naming;
pub mod normalize;
pub mod readers;
pub mod scene;
pub mod serialize;
pub mod textures;

pub use context::{
    ConversionContext, ConvertOptions, HierarchyMode, MaterialPolicy, MeshFormat, RenderDefaults,
    UpAxis,
};
pub use diagnostics::{Stage, Subject, SubjectKind, Warning, WarningCollector, WarningSink};
pub use driver::{
    check, convert, convert_with_context, convert_with_options, convert_with_report, AssetEntry,
    AssetStatus, ConversionReport,
};
pub use error::{ConversionError, Location, ParseError};
pub use material::{map_material, map_materials, MappedMaterial, MappingRule};
pub use normalize::{normalize, NormalizeSummary};
pub use readers::{detect, read, InputFormat};
pub use scene::Scene;

// Target-side formats live in mitsuba-common
pub use mitsuba_common::{decode_mesh, MeshBuffers, PlyHeader, SerializedHeader};
