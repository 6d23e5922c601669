//! Draw ROI outlines over the image slices and save them as numbered JPEGs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use dicom::object::open_file;
use dicom_pixeldata::PixelDecoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use roi_toolbox::io::series::load_series;
use roi_toolbox::{ContourLoop, StructureSet};

use super::{EngineArgs, build_structure_set, read_records};
use crate::utils::{clean_output, is_folder_empty, prompt_to_cleanup, validate_input_folder};

/// CLI arguments for the `render` subcommand.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Image series folder containing DICOM (.dcm) files
    #[arg(long = "in")]
    pub input: PathBuf,

    /// Structures to draw (.json or RTSTRUCT .dcm)
    #[arg(long)]
    pub structures: PathBuf,

    /// Output folder for the JPEG files
    #[arg(long)]
    pub out: PathBuf,

    /// Clean the output folder without asking
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Only write slices that carry at least one visible loop
    #[arg(long)]
    pub contoured_only: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

pub fn run(args: &RenderArgs) -> Result<()> {
    validate_input_folder(&args.input)?;
    let (records, _) = read_records(&args.structures)?;

    let series = load_series(&args.input, args.engine.jobs)
        .with_context(|| format!("Failed to load image series: {:?}", args.input))?;
    for failure in &series.failures {
        eprintln!("✗ Skipped {:?}: {}", failure.path, failure.message);
    }
    let mut set = build_structure_set(series.geometry.clone(), &records, &args.engine)?;

    prepare_output(&args.out, args.force)?;

    let total = series.slices.len();
    let padding = total.to_string().len().max(4);
    let mut written = 0usize;

    for (slice, header) in series.slices.iter().enumerate() {
        let overlays = collect_overlays(&mut set, slice)?;
        if args.contoured_only && overlays.iter().all(|o| o.loops.is_empty()) {
            continue;
        }

        let output_path = args.out.join(format!("{:0padding$}.jpg", slice + 1));
        match render_slice(&header.path, &overlays, &output_path) {
            Ok(()) => {
                written += 1;
                println!(
                    "✓ Rendered: {:?} -> {:?}",
                    header.path.file_name().unwrap_or_default(),
                    output_path.file_name().unwrap_or_default()
                );
            }
            Err(e) => eprintln!(
                "✗ Failed to render {:?}: {e:#}",
                header.path.file_name().unwrap_or_default()
            ),
        }
    }

    println!("\nRender complete! Wrote {written} of {total} slice(s).");
    Ok(())
}

/// Loops of one ROI on one slice, with how to draw them.
struct Overlay {
    color: Rgb<u8>,
    width: u32,
    loops: Vec<ContourLoop>,
}

fn collect_overlays(set: &mut StructureSet, slice: usize) -> Result<Vec<Overlay>> {
    let ids: Vec<_> = set
        .rois()
        .iter()
        .filter(|roi| !roi.is_hidden())
        .map(|roi| roi.id())
        .collect();

    let mut overlays = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(roi) = set.get_mut(id) else {
            continue;
        };
        let color = Rgb(roi.color());
        let width = roi.line_width();
        let name = roi.name().to_string();
        let loops = roi
            .display_loops(slice)
            .with_context(|| format!("Failed to trace {name} on slice {slice}"))?
            .to_vec();
        overlays.push(Overlay {
            color,
            width,
            loops,
        });
    }
    Ok(overlays)
}

fn prepare_output(out: &Path, force: bool) -> Result<()> {
    let non_empty = out.exists() && !is_folder_empty(out).unwrap_or(true);
    let should_clean = non_empty && (force || prompt_to_cleanup(out)?.should_clean());
    clean_output(out, should_clean)?;
    fs::create_dir_all(out).with_context(|| format!("Failed to create output folder: {out:?}"))
}

fn load_dcm_as_image(dcm_path: &Path) -> Result<DynamicImage> {
    let dicom_obj =
        open_file(dcm_path).with_context(|| format!("Failed to open DICOM file: {dcm_path:?}"))?;

    let pixel_data = dicom_obj
        .decode_pixel_data()
        .with_context(|| format!("Failed to decode pixel data from: {dcm_path:?}"))?;

    pixel_data
        .to_dynamic_image(0)
        .with_context(|| format!("Failed to convert to image: {dcm_path:?}"))
}

fn render_slice(dcm_path: &Path, overlays: &[Overlay], output_path: &Path) -> Result<()> {
    let mut canvas = load_dcm_as_image(dcm_path)?.to_rgb8();
    for overlay in overlays {
        for contour_loop in &overlay.loops {
            draw_loop(&mut canvas, contour_loop, overlay.color, overlay.width);
        }
    }
    DynamicImage::ImageRgb8(canvas)
        .save_with_format(output_path, ImageFormat::Jpeg)
        .with_context(|| format!("Failed to save JPG: {output_path:?}"))
}

/// Outline a closed loop; widths above one are drawn as offset copies.
fn draw_loop(canvas: &mut RgbImage, contour_loop: &ContourLoop, color: Rgb<u8>, width: u32) {
    let closed = contour_loop.closed();
    let half = (width.max(1) as i32 - 1) / 2;
    for pair in closed.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        for dy in -half..=half {
            for dx in -half..=half {
                draw_line_segment_mut(
                    canvas,
                    ((x0 + dx) as f32, (y0 + dy) as f32),
                    ((x1 + dx) as f32, (y1 + dy) as f32),
                    color,
                );
            }
        }
    }
    if let [(x, y)] = contour_loop.points[..]
        && x >= 0
        && y >= 0
        && (x as u32) < canvas.width()
        && (y as u32) < canvas.height()
    {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}
