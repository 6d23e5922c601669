//! Conversions between contour representations and per-slice rasters.
//!
//! Four shapes of the same loop travel through this module:
//!
//! - a flat DICOM coordinate list `[x0, y0, z0, x1, y1, z1, ...]`,
//! - a 4xN homogeneous patient-space array,
//! - a 4xN homogeneous voxel-space array `(column, row, slice, 1)`,
//! - an integer pixel polygon `[(x, y), ...]` for scan-line rasterization.
//!
//! Rasterization and boundary tracing go through `imageproc`: polygons are
//! filled with `draw_polygon_mut`, boundaries are traced with Suzuki-Abe
//! border following (`find_contours`) and thinned with Douglas-Peucker
//! (`approximate_polygon_dp`).

use std::collections::{BTreeMap, HashMap};

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use imageproc::region_labelling::{Connectivity, connected_components};
use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoiError};
use crate::geometry::TransformPair;

/// Decimal places kept on voxel coordinates before integer rasterization.
pub const VOXEL_DECIMALS: i32 = 2;

/// Integer pixel position `(x, y)` = `(column, row)`.
pub type PixelPoint = (i32, i32);

/// How the loops of one slice are combined into a single raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopAccumulation {
    /// Pixels covered by any loop are set; overlaps stay binary.
    Union,
    /// Pixels covered by an odd number of loops are set, so a loop drawn
    /// inside another cancels it out. Traced holes come back this way.
    #[default]
    EvenOdd,
}

/// One closed boundary traced on a slice.
///
/// `points` does not repeat the first point; the closing edge is implicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContourLoop {
    pub points: Vec<PixelPoint>,
    /// Whether the loop bounds a hole rather than an outer border.
    pub is_hole: bool,
    /// Index of the enclosing loop in the same extraction result.
    pub parent: Option<usize>,
}

impl ContourLoop {
    /// Points with the first point repeated at the end.
    pub fn closed(&self) -> Vec<PixelPoint> {
        let mut points = self.points.clone();
        if let Some(first) = points.first().copied() {
            points.push(first);
        }
        points
    }

    /// Inclusive `(min, max)` corners, or `None` for an empty loop.
    pub fn bounding_box(&self) -> Option<(PixelPoint, PixelPoint)> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold((first, first), |(lo, hi), &(x, y)| {
            ((lo.0.min(x), lo.1.min(y)), (hi.0.max(x), hi.1.max(y)))
        }))
    }
}

/// Flat `[x, y, z, ...]` list to a 4xN homogeneous patient array.
pub fn dicom_list_to_patient_array(flat: &[f64]) -> Result<Array2<f64>> {
    if flat.len() % 3 != 0 {
        return Err(RoiError::MalformedContour { len: flat.len() });
    }
    let n = flat.len() / 3;
    Ok(Array2::from_shape_fn((4, n), |(row, col)| {
        if row == 3 { 1.0 } else { flat[col * 3 + row] }
    }))
}

/// Inverse of [`dicom_list_to_patient_array`]; the homogeneous row is dropped.
pub fn patient_array_to_dicom_list(patient: ArrayView2<'_, f64>) -> Vec<f64> {
    let rows = patient.nrows().min(3);
    patient
        .columns()
        .into_iter()
        .flat_map(|column| column.iter().take(rows).copied().collect::<Vec<_>>())
        .collect()
}

/// Map patient points to voxel space, rounded to [`VOXEL_DECIMALS`] places.
pub fn patient_to_voxel_vector(
    patient: ArrayView2<'_, f64>,
    transforms: &TransformPair,
) -> Result<Array2<f64>> {
    let scale = 10f64.powi(VOXEL_DECIMALS);
    Ok(transforms
        .to_voxel(patient)?
        .mapv(|v| (v * scale).round() / scale))
}

/// Drop z and the homogeneous row, rounding x/y to the nearest pixel.
pub fn voxel_vector_to_polygon(voxel: ArrayView2<'_, f64>) -> Vec<PixelPoint> {
    if voxel.nrows() < 2 {
        return Vec::new();
    }
    voxel
        .columns()
        .into_iter()
        .map(|column| (column[0].round() as i32, column[1].round() as i32))
        .collect()
}

/// Lift a pixel polygon back to a closed 4xN voxel array at `slice_z`.
pub fn polygon_to_voxel_vector(polygon: &[PixelPoint], slice_z: f64) -> Array2<f64> {
    let mut points = polygon.to_vec();
    if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied())
        && first != last
    {
        points.push(first);
    }
    Array2::from_shape_fn((4, points.len()), |(row, col)| match row {
        0 => f64::from(points[col].0),
        1 => f64::from(points[col].1),
        2 => slice_z,
        _ => 1.0,
    })
}

/// Fill every loop into a `rows x cols` raster of 0/1 values.
///
/// Boundary pixels count as inside. Loops may be given open or closed.
pub fn rasterize_slice(
    polygons: &[Vec<PixelPoint>],
    rows: usize,
    cols: usize,
    accumulation: LoopAccumulation,
) -> Array2<u8> {
    let mut out = Array2::<u8>::zeros((rows, cols));
    if rows == 0 || cols == 0 {
        return out;
    }

    for polygon in polygons {
        let mut canvas = GrayImage::new(cols as u32, rows as u32);
        fill_ring(&mut canvas, polygon, Luma([1]));
        let layer = image_to_slice(&canvas);

        Zip::from(&mut out).and(&layer).for_each(|acc, &v| {
            *acc = match accumulation {
                LoopAccumulation::Union => (*acc | v).min(1),
                LoopAccumulation::EvenOdd => *acc ^ v,
            }
        });
    }
    out
}

/// Trace every boundary of the nonzero region of `slice`.
///
/// Outer borders come first, then one loop per hole. A hole loop runs along
/// the hole's own pixels rather than the foreground around it, so filling
/// the outer loops and cancelling the hole loops under
/// [`LoopAccumulation::EvenOdd`] gives back exactly the traced region.
/// `parent` links a hole to its outer border and an island to the hole it
/// sits in. `tolerance` is the Douglas-Peucker distance in voxels; `0` keeps
/// every traced point.
pub fn extract_polygons(slice: ArrayView2<'_, u8>, tolerance: f64) -> Vec<ContourLoop> {
    let image = slice_to_image(slice);
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let outers: Vec<Vec<Point<i32>>> = find_contours::<i32>(&image)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .map(|contour| contour.points)
        .collect();
    if outers.is_empty() {
        return Vec::new();
    }

    let foreground = connected_components(&image, Connectivity::Eight, Luma([0u8]));
    let background = background_labels(&image);
    let exterior = background.get_pixel(0, 0).0[0];
    let holes = hole_borders(&background, exterior);

    let outer_by_label: HashMap<u32, usize> = outers
        .iter()
        .enumerate()
        .filter_map(|(i, points)| {
            let first = points.first()?;
            Some((foreground.get_pixel(first.x as u32, first.y as u32).0[0], i))
        })
        .collect();
    let hole_by_label: HashMap<u32, usize> = holes
        .iter()
        .enumerate()
        .map(|(i, hole)| (hole.label, outers.len() + i))
        .collect();

    let mut loops = Vec::with_capacity(outers.len() + holes.len());
    for points in &outers {
        // the pixel above a component's first pixel is background
        let parent = raster_first(points).and_then(|top| {
            let label = background.get_pixel(top.x as u32 + 1, top.y as u32).0[0];
            hole_by_label.get(&label).copied()
        });
        loops.push(ContourLoop {
            points: simplify(points, tolerance),
            is_hole: false,
            parent,
        });
    }
    for hole in &holes {
        // and the pixel above a hole's first pixel is foreground
        let (x, y) = hole.first;
        let parent = y
            .checked_sub(1)
            .map(|above| foreground.get_pixel(x, above).0[0])
            .and_then(|label| outer_by_label.get(&label).copied());
        loops.push(ContourLoop {
            points: simplify(&hole.points, tolerance),
            is_hole: true,
            parent,
        });
    }
    loops
}

type Corner = (u32, u32);

/// A 4-connected background component enclosed by the foreground.
struct HoleBorder {
    label: u32,
    /// First pixel in row-major order, in slice coordinates.
    first: (u32, u32),
    points: Vec<Point<i32>>,
}

/// Label 4-connected background components on a canvas padded by one pixel,
/// so every component touching the slice edge joins the exterior at `(0, 0)`.
fn background_labels(image: &GrayImage) -> ImageBuffer<Luma<u32>, Vec<u32>> {
    let (width, height) = image.dimensions();
    let padded = GrayImage::from_fn(width + 2, height + 2, |x, y| {
        let inside = x >= 1 && y >= 1 && x <= width && y <= height;
        if inside && image.get_pixel(x - 1, y - 1).0[0] > 0 {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    connected_components(&padded, Connectivity::Four, Luma([0u8]))
}

/// Trace the outer border of every hole component, cropped to its bounds.
fn hole_borders(labels: &ImageBuffer<Luma<u32>, Vec<u32>>, exterior: u32) -> Vec<HoleBorder> {
    // label -> (first pixel, min corner, max corner) in padded coordinates
    let mut bounds: BTreeMap<u32, (Corner, Corner, Corner)> = BTreeMap::new();
    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel.0[0];
        if label == 0 || label == exterior {
            continue;
        }
        bounds
            .entry(label)
            .and_modify(|(_, lo, hi)| {
                *lo = (lo.0.min(x), lo.1.min(y));
                *hi = (hi.0.max(x), hi.1.max(y));
            })
            .or_insert(((x, y), (x, y), (x, y)));
    }

    bounds
        .into_iter()
        .filter_map(|(label, (first, lo, hi))| {
            let mask = GrayImage::from_fn(hi.0 - lo.0 + 3, hi.1 - lo.1 + 3, |x, y| {
                let (px, py) = ((x + lo.0).wrapping_sub(1), (y + lo.1).wrapping_sub(1));
                let hit = px < labels.width()
                    && py < labels.height()
                    && labels.get_pixel(px, py).0[0] == label;
                Luma([if hit { 255 } else { 0 }])
            });
            let border = find_contours::<i32>(&mask)
                .into_iter()
                .find(|contour| contour.border_type == BorderType::Outer)?;
            // mask (1, 1) is padded (lo.0, lo.1), i.e. slice (lo.0 - 1, lo.1 - 1)
            let (dx, dy) = (lo.0 as i32 - 2, lo.1 as i32 - 2);
            Some(HoleBorder {
                label,
                first: (first.0 - 1, first.1 - 1),
                points: border
                    .points
                    .into_iter()
                    .map(|p| Point::new(p.x + dx, p.y + dy))
                    .collect(),
            })
        })
        .collect()
}

/// First point in row-major order.
fn raster_first(points: &[Point<i32>]) -> Option<Point<i32>> {
    points.iter().copied().min_by_key(|p| (p.y, p.x))
}

fn simplify(points: &[Point<i32>], tolerance: f64) -> Vec<PixelPoint> {
    let points = if tolerance > 0.0 && points.len() > 3 {
        approximate_polygon_dp(points, tolerance, true)
    } else {
        points.to_vec()
    };
    points.into_iter().map(|p| (p.x, p.y)).collect()
}

/// Copy a `[row, col]` slice into a grayscale image, nonzero → 255.
pub(crate) fn slice_to_image(slice: ArrayView2<'_, u8>) -> GrayImage {
    let (rows, cols) = slice.dim();
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([if slice[[y as usize, x as usize]] > 0 {
            255
        } else {
            0
        }])
    })
}

/// Copy a grayscale image back into a `[row, col]` array.
pub(crate) fn image_to_slice(image: &GrayImage) -> Array2<u8> {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
        image.get_pixel(col as u32, row as u32).0[0]
    })
}

/// Remove consecutive duplicates and a trailing closing point.
fn open_ring(polygon: &[PixelPoint]) -> Vec<PixelPoint> {
    let mut ring: Vec<PixelPoint> = Vec::with_capacity(polygon.len());
    for &point in polygon {
        if ring.last() != Some(&point) {
            ring.push(point);
        }
    }
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Fill a ring given open or closed; degenerate rings become a pixel or a
/// segment.
pub(crate) fn fill_ring(canvas: &mut GrayImage, ring: &[PixelPoint], color: Luma<u8>) {
    let ring = open_ring(ring);
    match ring.as_slice() {
        [] => {}
        [(x, y)] => {
            if *x >= 0 && *y >= 0 && (*x as u32) < canvas.width() && (*y as u32) < canvas.height()
            {
                canvas.put_pixel(*x as u32, *y as u32, color);
            }
        }
        [a, b] => draw_segment(canvas, *a, *b, color),
        _ => {
            let poly: Vec<Point<i32>> = ring.iter().map(|&(x, y)| Point::new(x, y)).collect();
            draw_polygon_mut(canvas, &poly, color);
            // boundary pixels belong to the region
            for (i, &a) in ring.iter().enumerate() {
                draw_segment(canvas, a, ring[(i + 1) % ring.len()], color);
            }
        }
    }
}

fn draw_segment(canvas: &mut GrayImage, a: PixelPoint, b: PixelPoint, color: Luma<u8>) {
    draw_line_segment_mut(
        canvas,
        (a.0 as f32, a.1 as f32),
        (b.0 as f32, b.1 as f32),
        color,
    );
}

// =============================================================================
// Unit Tests for contour module
// =============================================================================
