//! Volume geometry and the affine maps between patient and voxel space.
//!
//! Voxel coordinates are ordered `(x, y, z) = (column, row, slice)`. Patient
//! coordinates are millimetres in the DICOM patient frame.
//!
//! The forward map is `Scale · Rotation · Translation(-origin)`, the inverse
//! `Translation(origin) · Rotation⁻¹ · Scale⁻¹`. Which of `R` or `Rᵗ` forms
//! the rotation block is chosen by [`RotationConvention`], never guessed.

use ndarray::{Array2, ArrayView2, Axis, concatenate, s};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoiError};

/// Tolerance for unit length and orthogonality of direction cosines.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-4;

/// Which rotation block the transform pair is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationConvention {
    /// Orientation matrix as extracted from the direction cosines.
    #[default]
    Normal,
    /// Transposed orientation matrix.
    Reversed,
}

/// Immutable geometry of one loaded image volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeGeometry {
    pub rows: usize,
    pub cols: usize,
    pub slices: usize,
    /// `(row spacing, column spacing)` in mm, DICOM PixelSpacing order.
    pub pixel_spacing: (f64, f64),
    /// Distance between consecutive slice centres in mm.
    pub slice_spacing: f64,
    /// Rows are the row cosine, the column cosine and their cross product.
    pub orientation: [[f64; 3]; 3],
    /// Patient position of voxel `[0, 0, 0]`.
    pub origin: [f64; 3],
}

impl VolumeGeometry {
    /// Build and validate a geometry from its raw parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rows: usize,
        cols: usize,
        slices: usize,
        pixel_spacing: (f64, f64),
        slice_spacing: f64,
        row_cosine: [f64; 3],
        col_cosine: [f64; 3],
        origin: [f64; 3],
    ) -> Result<Self> {
        let geometry = Self {
            rows,
            cols,
            slices,
            pixel_spacing,
            slice_spacing,
            orientation: [row_cosine, col_cosine, cross(row_cosine, col_cosine)],
            origin,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Axis-aligned (identity orientation) geometry.
    pub fn axial(
        rows: usize,
        cols: usize,
        slices: usize,
        pixel_spacing: (f64, f64),
        slice_spacing: f64,
        origin: [f64; 3],
    ) -> Result<Self> {
        Self::new(
            rows,
            cols,
            slices,
            pixel_spacing,
            slice_spacing,
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            origin,
        )
    }

    /// Derive geometry from per-slice DICOM attributes.
    ///
    /// `image_orientation` is ImageOrientationPatient (row cosine followed by
    /// column cosine). `positions` are the ImagePositionPatient values of
    /// every slice in any order; they are sorted along the slice normal and
    /// the first sorted position becomes the origin. With a single slice the
    /// spacing falls back to `fallback_spacing` (usually SliceThickness).
    pub fn from_dicom(
        rows: usize,
        cols: usize,
        pixel_spacing: (f64, f64),
        image_orientation: [f64; 6],
        positions: &[[f64; 3]],
        fallback_spacing: Option<f64>,
    ) -> Result<Self> {
        let row_cosine = [
            image_orientation[0],
            image_orientation[1],
            image_orientation[2],
        ];
        let col_cosine = [
            image_orientation[3],
            image_orientation[4],
            image_orientation[5],
        ];
        let normal = cross(row_cosine, col_cosine);

        let mut sorted = positions.to_vec();
        sorted.sort_by(|a, b| dot(*a, normal).total_cmp(&dot(*b, normal)));

        let origin = *sorted
            .first()
            .ok_or_else(|| RoiError::DegenerateGeometry("no slice positions".into()))?;

        let slice_spacing = match sorted.get(1) {
            Some(next) => dot(sub(*next, origin), normal).abs(),
            None => fallback_spacing.unwrap_or(0.0),
        };

        Self::new(
            rows,
            cols,
            sorted.len(),
            pixel_spacing,
            slice_spacing,
            row_cosine,
            col_cosine,
            origin,
        )
    }

    /// Check spacing and orthonormality of the orientation matrix.
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 || self.slices == 0 {
            return Err(RoiError::DegenerateGeometry(format!(
                "empty volume {}x{}x{}",
                self.rows, self.cols, self.slices
            )));
        }

        let (row_spacing, col_spacing) = self.pixel_spacing;
        for (name, value) in [
            ("row spacing", row_spacing),
            ("column spacing", col_spacing),
            ("slice spacing", self.slice_spacing),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(RoiError::DegenerateGeometry(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        for (i, axis) in self.orientation.iter().enumerate() {
            let norm = dot(*axis, *axis).sqrt();
            if (norm - 1.0).abs() > ORTHONORMAL_TOLERANCE {
                return Err(RoiError::DegenerateGeometry(format!(
                    "orientation row {i} has length {norm:.6}"
                )));
            }
        }
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            let d = dot(self.orientation[i], self.orientation[j]);
            if d.abs() > ORTHONORMAL_TOLERANCE {
                return Err(RoiError::DegenerateGeometry(format!(
                    "orientation rows {i} and {j} are not orthogonal (dot {d:.6})"
                )));
            }
        }
        Ok(())
    }

    /// Volume dimensions in raster order `(rows, cols, slices)`.
    pub fn dim(&self) -> (usize, usize, usize) {
        (self.rows, self.cols, self.slices)
    }

    /// Build the transform pair for this geometry.
    pub fn transforms(&self, convention: RotationConvention) -> Result<TransformPair> {
        TransformPair::build(self, convention)
    }
}

/// The forward and inverse homogeneous maps of one geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPair {
    pub patient_to_voxel: Array2<f64>,
    pub voxel_to_patient: Array2<f64>,
    pub convention: RotationConvention,
}

impl TransformPair {
    /// Compose both 4x4 maps. Fails with `DegenerateGeometry` on invalid input.
    pub fn build(geometry: &VolumeGeometry, convention: RotationConvention) -> Result<Self> {
        geometry.validate()?;

        let rotation = rotation_block(&geometry.orientation, convention);
        let (row_spacing, col_spacing) = geometry.pixel_spacing;
        let spacing = [col_spacing, row_spacing, geometry.slice_spacing];

        let mut scale = Array2::<f64>::eye(4);
        let mut inverse_scale = Array2::<f64>::eye(4);
        for (i, value) in spacing.iter().enumerate() {
            scale[[i, i]] = 1.0 / value;
            inverse_scale[[i, i]] = *value;
        }

        let mut rotate = Array2::<f64>::eye(4);
        let mut inverse_rotate = Array2::<f64>::eye(4);
        for i in 0..3 {
            for j in 0..3 {
                rotate[[i, j]] = rotation[i][j];
                inverse_rotate[[j, i]] = rotation[i][j];
            }
        }

        let mut to_origin = Array2::<f64>::eye(4);
        let mut from_origin = Array2::<f64>::eye(4);
        for (i, value) in geometry.origin.iter().enumerate() {
            to_origin[[i, 3]] = -value;
            from_origin[[i, 3]] = *value;
        }

        let patient_to_voxel = scale.dot(&rotate).dot(&to_origin);
        let voxel_to_patient = from_origin.dot(&inverse_rotate).dot(&inverse_scale);

        Ok(Self {
            patient_to_voxel,
            voxel_to_patient,
            convention,
        })
    }

    /// Map patient points (3xN or 4xN) into voxel space.
    pub fn to_voxel(&self, points: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        apply(&self.patient_to_voxel, points)
    }

    /// Map voxel points (3xN or 4xN) into patient space.
    pub fn to_patient(&self, points: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        apply(&self.voxel_to_patient, points)
    }
}

/// Apply a 4x4 homogeneous map to column points.
///
/// Accepts 3xN points (an implicit row of ones is added) or 4xN points and
/// returns the same row count it was given.
pub fn apply(transform: &Array2<f64>, points: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    if transform.dim() != (4, 4) {
        return Err(RoiError::ShapeMismatch {
            expected: vec![4, 4],
            actual: transform.shape().to_vec(),
        });
    }

    match points.nrows() {
        4 => Ok(transform.dot(&points)),
        3 => {
            let ones = Array2::<f64>::ones((1, points.ncols()));
            let homogeneous = concatenate(Axis(0), &[points.view(), ones.view()]).map_err(|_| {
                RoiError::ShapeMismatch {
                    expected: vec![3, points.ncols()],
                    actual: points.shape().to_vec(),
                }
            })?;
            Ok(transform.dot(&homogeneous).slice(s![0..3, ..]).to_owned())
        }
        rows => Err(RoiError::ShapeMismatch {
            expected: vec![4, points.ncols()],
            actual: vec![rows, points.ncols()],
        }),
    }
}

fn rotation_block(orientation: &[[f64; 3]; 3], convention: RotationConvention) -> [[f64; 3]; 3] {
    match convention {
        RotationConvention::Normal => *orientation,
        RotationConvention::Reversed => {
            let mut transposed = [[0.0; 3]; 3];
            for (i, row) in orientation.iter().enumerate() {
                for (j, value) in row.iter().enumerate() {
                    transposed[j][i] = *value;
                }
            }
            transposed
        }
    }
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

// =============================================================================
// Unit Tests for geometry module
// =============================================================================
