//! Per-ROI binary voxel volume and its slice-scoped edits.
//!
//! The volume is indexed `[row, col, slice]`. A voxel is inside the ROI when
//! its value is nonzero; painted voxels take the raster's `on_value`.
//! Every mutating method checks its arguments before touching the volume, so
//! an `Err` always leaves the raster as it was.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::morphology::{dilate, erode};
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip, s};

use crate::contour::{PixelPoint, fill_ring, image_to_slice, slice_to_image};
use crate::error::{Result, RoiError};

/// Value written for painted voxels unless configured otherwise.
pub const FILL_VALUE: u8 = 255;

/// Divisor applied to the column count to size the structuring element.
const ELEMENT_DIVISOR: usize = 50;

/// A 3D binary raster owned by one ROI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoiRaster {
    data: Array3<u8>,
    on_value: u8,
}

impl RoiRaster {
    /// An all-zero raster of `(rows, cols, slices)`.
    pub fn new(rows: usize, cols: usize, slices: usize) -> Self {
        Self::from_array(Array3::zeros((rows, cols, slices)))
    }

    /// Wrap an existing `[row, col, slice]` volume.
    pub fn from_array(data: Array3<u8>) -> Self {
        Self {
            data,
            on_value: FILL_VALUE,
        }
    }

    /// Use `on_value` (e.g. `1`) for painted voxels instead of 255.
    pub fn with_on_value(mut self, on_value: u8) -> Self {
        self.on_value = on_value.max(1);
        self
    }

    pub fn on_value(&self) -> u8 {
        self.on_value
    }

    /// `(rows, cols, slices)`.
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    pub fn into_inner(self) -> Array3<u8> {
        self.data
    }

    /// Number of occupied voxels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// View of one slice as `[row, col]`.
    pub fn slice(&self, slice: usize) -> Result<ArrayView2<'_, u8>> {
        self.check_slice(slice)?;
        Ok(self.data.index_axis(Axis(2), slice))
    }

    pub fn slice_is_empty(&self, slice: usize) -> Result<bool> {
        Ok(self.slice(slice)?.iter().all(|&v| v == 0))
    }

    /// Indices of slices holding at least one occupied voxel.
    pub fn occupied_slices(&self) -> Vec<usize> {
        self.data
            .axis_iter(Axis(2))
            .enumerate()
            .filter(|(_, plane)| plane.iter().any(|&v| v > 0))
            .map(|(k, _)| k)
            .collect()
    }

    /// Whether the voxel at column `x`, row `y` is occupied.
    ///
    /// Positions outside the slice plane are never inside.
    pub fn is_inside(&self, slice: usize, x: i32, y: i32) -> Result<bool> {
        let plane = self.slice(slice)?;
        let (rows, cols) = plane.dim();
        if x < 0 || y < 0 || x as usize >= cols || y as usize >= rows {
            return Ok(false);
        }
        Ok(plane[[y as usize, x as usize]] > 0)
    }

    /// Fill (nonzero `fill`) or erase (`0`) a disc on one slice.
    pub fn paint_circle(
        &mut self,
        slice: usize,
        center_x: i32,
        center_y: i32,
        radius: u32,
        fill: u8,
    ) -> Result<()> {
        self.check_slice(slice)?;
        self.check_radius(radius)?;
        if !self.disc_reaches_slice((center_x, center_y), radius) {
            return Ok(());
        }
        let color = self.color_for(fill);
        self.edit_slice(slice, |canvas| {
            draw_filled_circle_mut(canvas, (center_x, center_y), radius as i32, color);
        });
        Ok(())
    }

    /// Rasterize a connected polyline of the given thickness with round joins.
    pub fn stroke_polyline(
        &mut self,
        slice: usize,
        points: &[PixelPoint],
        thickness: u32,
        fill: u8,
    ) -> Result<()> {
        self.check_slice(slice)?;
        let radius = thickness / 2;
        self.check_radius(radius)?;
        if points.is_empty() {
            return Ok(());
        }
        let color = self.color_for(fill);
        let (lo, hi) = self.reach_box(radius);
        self.edit_slice(slice, |canvas| {
            for &point in points {
                if point_in_box(point, lo, hi) {
                    draw_filled_circle_mut(canvas, point, radius as i32, color);
                }
            }
            for pair in points.windows(2) {
                if let Some((a, b)) = clip_segment(pair[0], pair[1], lo, hi) {
                    let ring = segment_band(a, b, f64::from(radius));
                    fill_ring(canvas, &ring, color);
                }
            }
        });
        Ok(())
    }

    /// Largest brush radius an edit accepts: `rows + cols`, enough to cover
    /// the whole slice from any pixel on it.
    pub fn max_radius(&self) -> u32 {
        let (rows, cols, _) = self.dim();
        u32::try_from(rows + cols).unwrap_or(u32::MAX)
    }

    /// Side of the elliptical structuring element for this raster:
    /// `max(1, cols / 50)`.
    pub fn structuring_element_size(&self) -> u32 {
        (self.dim().1 / ELEMENT_DIVISOR).max(1) as u32
    }

    /// Morphological dilation of one slice.
    pub fn dilate(&mut self, slice: usize, element_size: u32) -> Result<()> {
        self.morph(slice, element_size, dilate)
    }

    /// Morphological erosion of one slice.
    pub fn erode(&mut self, slice: usize, element_size: u32) -> Result<()> {
        self.morph(slice, element_size, erode)
    }

    /// Merge the slice at `slice + direction` into `slice`.
    ///
    /// The sum is saturated and re-binarized so values stay in `{0, on}`.
    /// At the first or last slice nothing changes and `BoundaryReached` is
    /// returned.
    pub fn union_with_neighbor(&mut self, slice: usize, direction: i32) -> Result<()> {
        self.check_slice(slice)?;
        let neighbor = slice as i64 + i64::from(direction.signum());
        if direction == 0 || neighbor < 0 || neighbor as usize >= self.dim().2 {
            return Err(RoiError::BoundaryReached { slice, direction });
        }

        let source = self.data.index_axis(Axis(2), neighbor as usize).to_owned();
        let on = self.on_value;
        Zip::from(self.data.index_axis_mut(Axis(2), slice))
            .and(&source)
            .for_each(|dst, &src| *dst = binarize(dst.saturating_add(src), on));
        Ok(())
    }

    /// Boolean union with another raster of the same shape.
    pub fn union_with(&mut self, other: &RoiRaster) -> Result<()> {
        self.check_same_shape(other)?;
        let on = self.on_value;
        Zip::from(&mut self.data)
            .and(&other.data)
            .for_each(|dst, &src| *dst = binarize(dst.saturating_add(src), on));
        Ok(())
    }

    /// Boolean difference: clear every voxel occupied in `other`.
    pub fn difference_with(&mut self, other: &RoiRaster) -> Result<()> {
        self.check_same_shape(other)?;
        Zip::from(&mut self.data)
            .and(&other.data)
            .for_each(|dst, &src| {
                if src > 0 {
                    *dst = 0;
                }
            });
        Ok(())
    }

    /// Overwrite one slice with a `[row, col]` mask (nonzero → on).
    pub fn write_slice(&mut self, slice: usize, mask: ArrayView2<'_, u8>) -> Result<()> {
        self.check_slice(slice)?;
        let (rows, cols, _) = self.dim();
        if mask.dim() != (rows, cols) {
            return Err(RoiError::ShapeMismatch {
                expected: vec![rows, cols],
                actual: mask.shape().to_vec(),
            });
        }
        let on = self.on_value;
        Zip::from(self.data.index_axis_mut(Axis(2), slice))
            .and(&mask)
            .for_each(|dst, &src| *dst = binarize(src, on));
        Ok(())
    }

    /// Voxel centre of mass `(row, col, slice)`, or `None` when empty.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        let mut sum = [0.0; 3];
        let mut n = 0usize;
        for ((r, c, k), &v) in self.data.indexed_iter() {
            if v > 0 {
                sum[0] += r as f64;
                sum[1] += c as f64;
                sum[2] += k as f64;
                n += 1;
            }
        }
        (n > 0).then(|| sum.map(|s| s / n as f64))
    }

    /// Inclusive `(min, max)` occupied index per axis, or `None` when empty.
    pub fn bounding_cuboid(&self) -> Option<([usize; 3], [usize; 3])> {
        let mut bounds: Option<([usize; 3], [usize; 3])> = None;
        for ((r, c, k), &v) in self.data.indexed_iter() {
            if v == 0 {
                continue;
            }
            let idx = [r, c, k];
            bounds = Some(match bounds {
                None => (idx, idx),
                Some((lo, hi)) => (
                    [lo[0].min(r), lo[1].min(c), lo[2].min(k)],
                    [hi[0].max(r), hi[1].max(c), hi[2].max(k)],
                ),
            });
        }
        bounds
    }

    /// Reflect the occupied sub-volume about `center` along `axis`.
    ///
    /// Index `i` lands on `round(2 * center[axis] - i)`; voxels reflected
    /// outside the volume are dropped.
    pub fn reflected(&self, center: [f64; 3], axis: usize) -> Result<RoiRaster> {
        if axis > 2 {
            return Err(RoiError::IndexOutOfRange {
                what: "axis",
                index: axis as i64,
                len: 3,
            });
        }
        let mut out = RoiRaster {
            data: Array3::zeros(self.data.raw_dim()),
            on_value: self.on_value,
        };
        let Some((lo, hi)) = self.bounding_cuboid() else {
            return Ok(out);
        };

        let extent = self.data.shape()[axis] as i64;
        let cropped = self
            .data
            .slice(s![lo[0]..=hi[0], lo[1]..=hi[1], lo[2]..=hi[2]]);
        for ((r, c, k), &v) in cropped.indexed_iter() {
            if v == 0 {
                continue;
            }
            let mut idx = [r + lo[0], c + lo[1], k + lo[2]];
            let mirrored = (2.0 * center[axis] - idx[axis] as f64).round() as i64;
            if mirrored < 0 || mirrored >= extent {
                continue;
            }
            idx[axis] = mirrored as usize;
            out.data[idx] = self.on_value;
        }
        Ok(out)
    }

    fn check_slice(&self, slice: usize) -> Result<()> {
        let slices = self.dim().2;
        if slice >= slices {
            return Err(RoiError::IndexOutOfRange {
                what: "slice",
                index: slice as i64,
                len: slices,
            });
        }
        Ok(())
    }

    fn check_radius(&self, radius: u32) -> Result<()> {
        let max = self.max_radius();
        if radius > max {
            return Err(RoiError::IndexOutOfRange {
                what: "radius",
                index: i64::from(radius),
                len: max as usize + 1,
            });
        }
        Ok(())
    }

    /// Corners of the region whose discs of `radius` can touch the slice,
    /// widened by one pixel.
    fn reach_box(&self, radius: u32) -> ((f64, f64), (f64, f64)) {
        let (rows, cols, _) = self.dim();
        let r = f64::from(radius) + 1.0;
        ((-r, -r), (cols as f64 - 1.0 + r, rows as f64 - 1.0 + r))
    }

    fn disc_reaches_slice(&self, center: PixelPoint, radius: u32) -> bool {
        let (lo, hi) = self.reach_box(radius);
        point_in_box(center, lo, hi)
    }

    fn check_same_shape(&self, other: &RoiRaster) -> Result<()> {
        if self.data.shape() != other.data.shape() {
            return Err(RoiError::ShapeMismatch {
                expected: self.data.shape().to_vec(),
                actual: other.data.shape().to_vec(),
            });
        }
        Ok(())
    }

    fn color_for(&self, fill: u8) -> Luma<u8> {
        Luma([if fill == 0 { 0 } else { self.on_value }])
    }

    /// Run a drawing closure against a copy of one slice and store the result.
    fn edit_slice(&mut self, slice: usize, draw: impl FnOnce(&mut GrayImage)) {
        let mut canvas = self.slice_canvas(slice);
        draw(&mut canvas);
        self.store_canvas(slice, &canvas);
    }

    /// Slice copy that keeps the raw voxel values.
    fn slice_canvas(&self, slice: usize) -> GrayImage {
        let plane = self.data.index_axis(Axis(2), slice);
        let (rows, cols) = plane.dim();
        GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
            Luma([plane[[y as usize, x as usize]]])
        })
    }

    fn store_canvas(&mut self, slice: usize, canvas: &GrayImage) {
        let plane: Array2<u8> = image_to_slice(canvas);
        self.data.index_axis_mut(Axis(2), slice).assign(&plane);
    }

    fn morph(
        &mut self,
        slice: usize,
        element_size: u32,
        op: fn(&GrayImage, Norm, u8) -> GrayImage,
    ) -> Result<()> {
        self.check_slice(slice)?;
        let radius = element_size.div_ceil(2).clamp(1, u32::from(u8::MAX)) as u8;
        let image = slice_to_image(self.data.index_axis(Axis(2), slice));
        let result = image_to_slice(&op(&image, Norm::L2, radius));
        let on = self.on_value;
        Zip::from(self.data.index_axis_mut(Axis(2), slice))
            .and(&result)
            .for_each(|dst, &src| *dst = binarize(src, on));
        Ok(())
    }
}

#[inline]
const fn binarize(value: u8, on: u8) -> u8 {
    if value > 0 { on } else { 0 }
}

fn point_in_box((x, y): PixelPoint, lo: (f64, f64), hi: (f64, f64)) -> bool {
    let (x, y) = (f64::from(x), f64::from(y));
    x >= lo.0 && y >= lo.1 && x <= hi.0 && y <= hi.1
}

/// Liang-Barsky clip of segment `a`-`b` to the box `lo`..`hi`.
fn clip_segment(
    a: PixelPoint,
    b: PixelPoint,
    lo: (f64, f64),
    hi: (f64, f64),
) -> Option<(PixelPoint, PixelPoint)> {
    let (x0, y0) = (f64::from(a.0), f64::from(a.1));
    let (dx, dy) = (f64::from(b.0) - x0, f64::from(b.1) - y0);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);

    for (p, q) in [
        (-dx, x0 - lo.0),
        (dx, hi.0 - x0),
        (-dy, y0 - lo.1),
        (dy, hi.1 - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| ((x0 + t * dx).round() as i32, (y0 + t * dy).round() as i32);
    Some((at(t0), at(t1)))
}

/// Quadrilateral covering a segment widened by `radius` on both sides.
fn segment_band(a: PixelPoint, b: PixelPoint, radius: f64) -> Vec<PixelPoint> {
    let (dx, dy) = (f64::from(b.0 - a.0), f64::from(b.1 - a.1));
    let length = dx.hypot(dy);
    if length == 0.0 {
        return vec![a];
    }
    let (nx, ny) = (-dy / length * radius, dx / length * radius);
    let offset = |p: PixelPoint, sign: f64| {
        (
            (f64::from(p.0) + sign * nx).round() as i32,
            (f64::from(p.1) + sign * ny).round() as i32,
        )
    };
    vec![offset(a, 1.0), offset(b, 1.0), offset(b, -1.0), offset(a, -1.0)]
}

// =============================================================================
// Unit Tests for raster module
// =============================================================================
