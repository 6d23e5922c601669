//! Error kinds raised by the contour engine.

use thiserror::Error;

/// Errors produced by geometry, codec, raster and structure-set operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoiError {
    /// Spacing or orientation cannot describe a real volume.
    #[error("Degenerate volume geometry: {0}")]
    DegenerateGeometry(String),

    /// A flat coordinate list whose length is not a multiple of three.
    #[error("Malformed contour: {len} coordinates is not a multiple of 3")]
    MalformedContour { len: usize },

    /// Slice, ROI or ordinal index outside its valid range.
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: i64,
        len: usize,
    },

    /// Cross-slice union attempted past the first or last slice.
    #[error("No neighbour slice in direction {direction} from slice {slice}")]
    BoundaryReached { slice: usize, direction: i32 },

    /// An ROI name is already taken.
    #[error("ROI name already in use: {0}")]
    NameCollision(String),

    /// An operation needs occupied voxels and the ROI has none.
    #[error("ROI has no occupied voxels: {0}")]
    EmptyRoi(String),

    /// Lookup of an ROI that does not exist.
    #[error("Unknown ROI: {0}")]
    UnknownRoi(String),

    /// Two rasters or arrays whose shapes must agree do not.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

impl RoiError {
    /// Whether the condition is a warning rather than a failure.
    ///
    /// `BoundaryReached` leaves state untouched and only needs reporting.
    pub fn is_notice(&self) -> bool {
        matches!(self, Self::BoundaryReached { .. } | Self::NameCollision(_))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RoiError>;
