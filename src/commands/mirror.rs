//! Mirror one ROI about the centroid of another and save the result as a
//! new ROI.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use roi_toolbox::RoiKey;

use super::{
    EngineArgs, GeometrySource, build_structure_set, load_optional_series, read_records,
    resolve_geometry, write_structure_set,
};

/// Voxel axis to reflect along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MirrorAxis {
    /// Image rows (anterior/posterior on axial images)
    Row,
    /// Image columns (left/right on axial images)
    Column,
    /// Slice index
    Slice,
}

impl MirrorAxis {
    /// Index into the `[row, col, slice]` raster.
    pub fn index(self) -> usize {
        match self {
            Self::Row => 0,
            Self::Column => 1,
            Self::Slice => 2,
        }
    }
}

/// CLI arguments for the `mirror` subcommand.
#[derive(Args, Debug)]
pub struct MirrorArgs {
    /// Input structures (.json or RTSTRUCT .dcm)
    #[arg(long)]
    pub structures: PathBuf,

    /// Name of the ROI to reflect
    #[arg(long)]
    pub source: String,

    /// Name of the ROI whose centroid is the mirror centre
    #[arg(long)]
    pub reference: String,

    /// Axis to reflect along
    #[arg(long, value_enum, default_value_t = MirrorAxis::Column)]
    pub axis: MirrorAxis,

    /// Name of the new ROI (default: "<source> mirrored")
    #[arg(long)]
    pub name: Option<String>,

    /// Output structures (.json or .dcm)
    #[arg(long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub source_geometry: GeometrySource,

    #[command(flatten)]
    pub engine: EngineArgs,
}

pub fn run(args: &MirrorArgs) -> Result<()> {
    let (records, embedded) = read_records(&args.structures)?;
    let series = load_optional_series(&args.source_geometry, args.engine.jobs)?;
    let geometry = resolve_geometry(series.as_ref(), &args.source_geometry, embedded)?;
    let mut set = build_structure_set(geometry, &records, &args.engine)?;

    let source = set
        .select(&RoiKey::Name(args.source.clone()))
        .with_context(|| format!("Source ROI not found: {}", args.source))?;
    let reference = set
        .find(&RoiKey::Name(args.reference.clone()))
        .with_context(|| format!("Reference ROI not found: {}", args.reference))?;

    let name = args
        .name
        .clone()
        .unwrap_or_else(|| format!("{} mirrored", args.source));
    let id = set
        .add_mirrored_roi(source, reference, args.axis.index(), &name)
        .with_context(|| format!("Failed to mirror {} about {}", args.source, args.reference))?;

    let voxels = set.get(id).map_or(0, |roi| roi.raster().count());
    println!(
        "✓ Mirrored {} about {} along {:?}: {} voxel(s) in \"{}\"",
        args.source, args.reference, args.axis, voxels, name
    );

    write_structure_set(&args.out, &set, series.as_ref(), "ROI")
}
