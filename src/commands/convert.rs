//! Structure files in, structure files out, through the voxel rasters.
//!
//! Loops are rasterized on import and traced again on export, so the output
//! holds one loop per connected boundary per slice no matter how the input
//! was drawn.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::{
    EngineArgs, GeometrySource, build_structure_set, load_optional_series, read_records,
    resolve_geometry, write_structure_set,
};

/// CLI arguments for the `convert` subcommand.
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input structures (.json or RTSTRUCT .dcm)
    #[arg(long)]
    pub structures: PathBuf,

    /// Output structures (.json or .dcm)
    #[arg(long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub source: GeometrySource,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Structure Set Label written to RTSTRUCT output
    #[arg(long, default_value = "ROI")]
    pub label: String,
}

pub fn run(args: &ConvertArgs) -> Result<()> {
    let (records, embedded) = read_records(&args.structures)?;
    println!(
        "Found {} ROI(s) in {:?}",
        records.len(),
        args.structures
    );

    let series = load_optional_series(&args.source, args.engine.jobs)?;
    let geometry = resolve_geometry(series.as_ref(), &args.source, embedded)?;
    println!(
        "Volume: {} x {} x {} (rows x cols x slices)\n",
        geometry.rows, geometry.cols, geometry.slices
    );

    let set = build_structure_set(geometry, &records, &args.engine)?;
    for roi in set.rois() {
        println!(
            "  - {}: {} voxel(s) on {} slice(s)",
            roi.name(),
            roi.raster().count(),
            roi.raster().occupied_slices().len()
        );
    }
    println!();

    write_structure_set(&args.out, &set, series.as_ref(), &args.label)?;
    println!("Conversion complete!");
    Ok(())
}
