//! mitsuba-export - asset to Mitsuba 3 scene converter
//!
//! Converts glTF/GLB and OBJ/MTL assets into a Mitsuba 3 scene directory
//! (scene.xml, meshes/, textures/)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mitsuba_common::formats::{ply, serialized};
use mitsuba_common::{FLAG_COLORS, FLAG_FACE_NORMALS, FLAG_NORMALS, FLAG_TEXCOORDS};

use mitsuba_export::{
    check, convert_with_report, ConversionReport, ConvertOptions, HierarchyMode, MeshFormat, UpAxis,
};

#[derive(Parser)]
#[command(name = "mitsuba-export")]
#[command(about = "Convert glTF/OBJ assets into Mitsuba 3 scenes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by `convert` and `check`
#[derive(clap::Args)]
struct OptionArgs {
    /// TOML file with conversion options; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Up axis assumed for OBJ input (y or z)
    #[arg(long)]
    obj_up: Option<UpAxis>,

    /// Up axis of the emitted scene (y or z)
    #[arg(long)]
    target_up: Option<UpAxis>,

    /// Mirror the scene, switching handedness
    #[arg(long)]
    flip_handedness: bool,

    /// Emit UVs with a bottom-left origin
    #[arg(long)]
    flip_uv: bool,

    /// Make every opaque BSDF two-sided
    #[arg(long)]
    two_sided: bool,

    /// Transform output (flatten or nested)
    #[arg(long)]
    hierarchy: Option<HierarchyMode>,

    /// Mesh file format (serialized or ply)
    #[arg(long)]
    mesh_format: Option<MeshFormat>,

    /// Vertex dedup tolerance; 0 compares exact values
    #[arg(long)]
    epsilon: Option<f32>,
}

impl OptionArgs {
    fn resolve(&self) -> Result<ConvertOptions> {
        let mut options = match &self.config {
            Some(path) => ConvertOptions::load(path)?,
            None => ConvertOptions::default(),
        };
        if let Some(axis) = self.obj_up {
            options.obj_up_axis = axis;
        }
        if let Some(axis) = self.target_up {
            options.target_up_axis = axis;
        }
        options.flip_handedness |= self.flip_handedness;
        options.flip_uv |= self.flip_uv;
        options.force_two_sided |= self.two_sided;
        if let Some(hierarchy) = self.hierarchy {
            options.hierarchy = hierarchy;
        }
        if let Some(format) = self.mesh_format {
            options.mesh_format = format;
        }
        if let Some(epsilon) = self.epsilon {
            options.dedup_epsilon = epsilon;
        }
        options.validate()?;
        Ok(options)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an asset into a scene directory
    Convert {
        /// Input .gltf, .glb or .obj file
        input: PathBuf,

        /// Output directory
        output: PathBuf,

        #[command(flatten)]
        options: OptionArgs,

        /// Write the JSON conversion report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Read, normalize and map an asset without writing output
    Check {
        /// Input .gltf, .glb or .obj file
        input: PathBuf,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// Print the header of a .serialized or .ply mesh file
    Inspect {
        /// Mesh file
        mesh: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            options,
            report,
        } => {
            let options = options.resolve()?;
            tracing::info!("Converting {:?} -> {:?}", input, output);
            let result = convert_with_report(&input, &output, options);
            if let Some(path) = report {
                write_report(&result, &path)?;
            }
            print_warnings(&result);
            if !result.success {
                anyhow::bail!(
                    "conversion failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            tracing::info!("Done! {} warning(s)", result.warnings.len());
        }

        Commands::Check { input, options } => {
            let options = options.resolve()?;
            tracing::info!("Checking {:?}", input);
            let result = check(&input, options)?;
            print_warnings(&result);
            println!(
                "{}: {} asset(s), {} warning(s)",
                input.display(),
                result.assets.len(),
                result.warnings.len()
            );
        }

        Commands::Inspect { mesh } => inspect(&mesh)?,
    }

    Ok(())
}

fn write_report(report: &ConversionReport, path: &Path) -> Result<()> {
    let json = report.to_json()?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))
}

fn print_warnings(report: &ConversionReport) {
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
}

fn inspect(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;

    if bytes.starts_with(b"ply") {
        let (header, _) = ply::parse_header(&bytes)?;
        println!("format:     ply (binary_little_endian 1.0)");
        println!("name:       {}", header.name);
        println!("vertices:   {}", header.vertex_count);
        println!("faces:      {}", header.face_count);
        println!("properties: {}", header.vertex_properties.join(" "));
    } else {
        let (header, _) = serialized::decode(&bytes)?;
        let attributes: Vec<&str> = [
            (FLAG_NORMALS, "normals"),
            (FLAG_TEXCOORDS, "texcoords"),
            (FLAG_COLORS, "colors"),
            (FLAG_FACE_NORMALS, "face_normals"),
        ]
        .iter()
        .filter(|(flag, _)| header.has(*flag))
        .map(|(_, name)| *name)
        .collect();
        println!("format:     serialized v4");
        println!("name:       {}", header.name);
        println!("flags:      0x{:04x} ({})", header.flags, attributes.join(", "));
        println!("vertices:   {}", header.vertex_count);
        println!("triangles:  {}", header.triangle_count);
    }
    Ok(())
}
