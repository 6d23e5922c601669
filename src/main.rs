//! # ROI Toolbox
//!
//! A command-line tool to move DICOM regions of interest between contour
//! files and voxel masks.
//!
//! ## Features
//!
//! - Convert structures between JSON and RTSTRUCT through the voxel rasters
//! - Analyze an image series and report its volume geometry
//! - Mirror an ROI about the centroid of another ROI
//! - Render ROI outlines over the image slices as JPEGs
//!
//! ## Usage
//!
//! ```bash
//! roi-toolbox analyze --in <series>
//! roi-toolbox convert --structures <in.json|rs.dcm> --out <out.json|rs.dcm> [--in <series>]
//! roi-toolbox mirror --structures <file> --source <roi> --reference <roi> --out <file>
//! roi-toolbox render --in <series> --structures <file> --out <folder>
//! ```
//!
//! Set `RUST_LOG` to tune the diagnostics written to stderr.

mod commands;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{analyze, convert, mirror, render};

#[derive(Parser, Debug)]
#[command(name = "roi-toolbox")]
#[command(about = "Convert, mirror and render DICOM regions of interest")]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze an image series folder and print its volume geometry
    Analyze {
        #[command(flatten)]
        args: analyze::AnalyzeArgs,
    },
    /// Rasterize structures and write them back out as JSON or RTSTRUCT
    Convert {
        #[command(flatten)]
        args: convert::ConvertArgs,
    },
    /// Reflect one ROI about the centroid of another
    Mirror {
        #[command(flatten)]
        args: mirror::MirrorArgs,
    },
    /// Draw ROI outlines over the image slices as JPG files
    Render {
        #[command(flatten)]
        args: render::RenderArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    match args.command {
        Commands::Analyze { args } => analyze::run(&args),
        Commands::Convert { args } => convert::run(&args),
        Commands::Mirror { args } => mirror::run(&args),
        Commands::Render { args } => render::run(&args),
    }
}
