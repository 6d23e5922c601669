//! CLI subcommands and the plumbing they share.

pub mod analyze;
pub mod convert;
pub mod mirror;
pub mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use roi_toolbox::io::json::{StructureFile, read_geometry, read_structure_file, write_structure_file};
use roi_toolbox::io::rtstruct::{RtStructMeta, read_rtstruct, write_rtstruct};
use roi_toolbox::io::series::{ImageSeries, load_series};
use roi_toolbox::{LoopAccumulation, RoiContours, RotationConvention, StructureSet, VolumeGeometry};

use crate::utils::{validate_input_file, validate_input_folder};

/// Options shared by every command that runs contours through the rasters.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Douglas-Peucker tolerance in voxels applied to exported loops (0 keeps every point)
    #[arg(long, default_value_t = 0.0)]
    pub tolerance: f64,

    /// Build the transforms with the transposed orientation matrix
    #[arg(long)]
    pub reverse_rotation: bool,

    /// Merge loops on the same slice instead of letting nested loops cut holes
    #[arg(long)]
    pub union: bool,

    /// Worker threads used to read DICOM headers (default: all cores)
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,
}

impl EngineArgs {
    pub fn convention(&self) -> RotationConvention {
        if self.reverse_rotation {
            RotationConvention::Reversed
        } else {
            RotationConvention::Normal
        }
    }

    pub fn accumulation(&self) -> LoopAccumulation {
        if self.union {
            LoopAccumulation::Union
        } else {
            LoopAccumulation::EvenOdd
        }
    }
}

/// Where the volume geometry comes from.
#[derive(Args, Debug, Clone)]
pub struct GeometrySource {
    /// Image series folder whose geometry the structures refer to
    #[arg(long = "in")]
    pub input: Option<PathBuf>,

    /// JSON file holding a `geometry` object
    #[arg(long)]
    pub geometry: Option<PathBuf>,
}

/// Structure file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureFormat {
    Json,
    RtStruct,
}

impl StructureFormat {
    /// `.json` is JSON, everything else is treated as DICOM.
    pub fn from_path(path: &Path) -> Self {
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            Self::Json
        } else {
            Self::RtStruct
        }
    }
}

/// Structure records plus any geometry stored alongside them.
pub fn read_records(path: &Path) -> Result<(Vec<RoiContours>, Option<VolumeGeometry>)> {
    validate_input_file(path)?;
    match StructureFormat::from_path(path) {
        StructureFormat::Json => {
            let file = read_structure_file(path)
                .with_context(|| format!("Failed to read structure file: {path:?}"))?;
            Ok((file.rois, file.geometry))
        }
        StructureFormat::RtStruct => {
            let records = read_rtstruct(path)
                .with_context(|| format!("Failed to read RTSTRUCT: {path:?}"))?;
            Ok((records, None))
        }
    }
}

/// Load the series named by `--in`, if any.
pub fn load_optional_series(source: &GeometrySource, jobs: Option<usize>) -> Result<Option<ImageSeries>> {
    let Some(input) = &source.input else {
        return Ok(None);
    };
    validate_input_folder(input)?;
    let series = load_series(input, jobs)
        .with_context(|| format!("Failed to load image series: {input:?}"))?;
    for failure in &series.failures {
        eprintln!("✗ Skipped {:?}: {}", failure.path, failure.message);
    }
    Ok(Some(series))
}

/// Pick the geometry: series first, then `--geometry`, then the structure file.
pub fn resolve_geometry(
    series: Option<&ImageSeries>,
    source: &GeometrySource,
    embedded: Option<VolumeGeometry>,
) -> Result<VolumeGeometry> {
    if let Some(series) = series {
        return Ok(series.geometry.clone());
    }
    if let Some(path) = &source.geometry {
        validate_input_file(path)?;
        return read_geometry(path).with_context(|| format!("Failed to read geometry: {path:?}"));
    }
    embedded.context("No volume geometry: pass --in <series> or --geometry <file.json>")
}

/// Rasterize `records` into a fresh structure set.
pub fn build_structure_set(
    geometry: VolumeGeometry,
    records: &[RoiContours],
    engine: &EngineArgs,
) -> Result<StructureSet> {
    let mut set = StructureSet::new(geometry, engine.convention())
        .context("Invalid volume geometry")?
        .with_accumulation(engine.accumulation());

    let report = set
        .import_contours(records)
        .context("Failed to import contours")?;
    println!(
        "✓ Imported {} ROI(s), {} loop(s)",
        report.rois, report.loops
    );
    if report.skipped > 0 {
        eprintln!("✗ Skipped {} malformed or out-of-volume loop(s)", report.skipped);
    }

    let ids: Vec<_> = set.rois().iter().map(|roi| roi.id()).collect();
    for id in ids {
        if let Some(roi) = set.get_mut(id) {
            roi.set_tolerance(engine.tolerance);
        }
    }
    Ok(set)
}

/// Export every ROI and write it in the format implied by `path`.
pub fn write_structure_set(
    path: &Path,
    set: &StructureSet,
    series: Option<&ImageSeries>,
    label: &str,
) -> Result<()> {
    let records = set.export_contours().context("Failed to export contours")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output folder: {parent:?}"))?;
    }

    match StructureFormat::from_path(path) {
        StructureFormat::Json => {
            let file = StructureFile {
                geometry: Some(set.geometry().clone()),
                rois: records,
            };
            write_structure_file(path, &file)
                .with_context(|| format!("Failed to write structure file: {path:?}"))?;
        }
        StructureFormat::RtStruct => {
            let meta = RtStructMeta {
                label: label.to_string(),
                frame_of_reference_uid: series
                    .and_then(ImageSeries::frame_of_reference_uid)
                    .map(str::to_string),
                ..RtStructMeta::default()
            };
            write_rtstruct(path, &records, &meta)
                .with_context(|| format!("Failed to write RTSTRUCT: {path:?}"))?;
        }
    }

    println!("✓ Saved {} ROI(s) to: {:?}", set.len(), path);
    Ok(())
}
