//! Report the volume geometry and modality mix of an image series folder.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ndarray::array;

use roi_toolbox::io::series::{ImageSeries, list_dicom_files, load_series};
use roi_toolbox::{RotationConvention, VolumeGeometry};

use crate::utils::validate_input_folder;

/// CLI arguments for the `analyze` subcommand.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Input folder containing DICOM (.dcm) files
    #[arg(long = "in")]
    pub input: PathBuf,

    /// Worker threads used to read DICOM headers (default: all cores)
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,
}

pub fn run(args: &AnalyzeArgs) -> Result<()> {
    validate_input_folder(&args.input)?;

    let dcm_files = list_dicom_files(&args.input)
        .with_context(|| format!("Failed to read input folder: {:?}", args.input))?;
    if dcm_files.is_empty() {
        println!("No .dcm files found in {:?}", args.input);
        return Ok(());
    }

    println!("Analyzing {} DICOM files...\n", dcm_files.len());

    let series = load_series(&args.input, args.jobs)
        .with_context(|| format!("Failed to load image series: {:?}", args.input))?;

    print_modalities(&series);
    print_geometry(&series.geometry)?;

    if !series.failures.is_empty() {
        println!("=== Skipped Files ===\n");
        for failure in &series.failures {
            eprintln!("✗ {:?}: {}", failure.path, failure.message);
        }
        println!();
    }

    println!(
        "✓ {} of {} file(s) form the volume",
        series.slices.len(),
        dcm_files.len()
    );
    Ok(())
}

fn print_modalities(series: &ImageSeries) {
    println!("=== Modalities ===\n");
    let mut entries: Vec<_> = series.modalities.iter().collect();
    entries.sort_by_key(|(_, count)| std::cmp::Reverse(**count));
    for (modality, count) in entries {
        println!("  - {modality}: {count} files");
    }
    if let Some(uid) = series.frame_of_reference_uid() {
        println!("  FrameOfReferenceUID: {uid}");
    }
    println!();
}

fn print_geometry(geometry: &VolumeGeometry) -> Result<()> {
    println!("=== Volume Geometry ===\n");
    println!(
        "  Size (rows x cols x slices): {} x {} x {}",
        geometry.rows, geometry.cols, geometry.slices
    );
    println!(
        "  Pixel spacing (row, col): {:.4} x {:.4} mm",
        geometry.pixel_spacing.0, geometry.pixel_spacing.1
    );
    println!("  Slice spacing: {:.4} mm", geometry.slice_spacing);
    println!("  Origin: {}", format_vector(&geometry.origin));
    for (label, row) in ["Row cosine", "Column cosine", "Normal"]
        .iter()
        .zip(geometry.orientation.iter())
    {
        println!("  {label}: {}", format_vector(row));
    }

    let far = [
        geometry.cols.saturating_sub(1) as f64,
        geometry.rows.saturating_sub(1) as f64,
        geometry.slices.saturating_sub(1) as f64,
    ];
    let corner = array![[far[0]], [far[1]], [far[2]]];
    for convention in [RotationConvention::Normal, RotationConvention::Reversed] {
        let patient = geometry
            .transforms(convention)
            .and_then(|t| t.to_patient(corner.view()))
            .context("Invalid volume geometry")?;
        println!(
            "  Far corner -> patient ({convention:?}): {}",
            format_vector(&[patient[[0, 0]], patient[[1, 0]], patient[[2, 0]]])
        );
    }
    println!();
    Ok(())
}

fn format_vector(v: &[f64; 3]) -> String {
    format!("({:.3}, {:.3}, {:.3})", v[0], v[1], v[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_use_three_decimals() {
        assert_eq!(format_vector(&[1.0, -2.5, 0.12345]), "(1.000, -2.500, 0.123)");
    }
}
