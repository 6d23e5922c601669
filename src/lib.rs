//! # ROI Toolbox
//!
//! Regions of interest over DICOM image volumes, kept both as per-ROI binary
//! voxel rasters and as planar contour loops in patient space.
//!
//! ## Modules
//!
//! - [`geometry`]: volume geometry and the patient/voxel affine pair
//! - [`contour`]: conversions between coordinate lists, voxel arrays,
//!   pixel polygons and slice rasters
//! - [`raster`]: the per-ROI voxel volume and its slice edits
//! - [`structure`]: named ROIs sharing one geometry, import/export, mirroring
//! - [`session`]: the brush editing state machine
//! - [`io`]: DICOM series, RTSTRUCT and JSON adapters
//!
//! ## Example
//!
//! ```
//! use roi_toolbox::{RotationConvention, StructureSet, VolumeGeometry};
//!
//! let geometry = VolumeGeometry::axial(100, 100, 1, (1.0, 1.0), 1.0, [0.0; 3])?;
//! let mut set = StructureSet::new(geometry, RotationConvention::Normal)?;
//! let id = set.add_roi("Lesion", [255, 0, 0]);
//!
//! let roi = set.get_mut(id).expect("just added");
//! roi.raster_mut().paint_circle(0, 50, 50, 10, 255)?;
//! assert_eq!(roi.display_loops(0)?.len(), 1);
//!
//! let exported = set.export_contours()?;
//! assert_eq!(exported[0].contours.len(), 1);
//! # Ok::<(), roi_toolbox::RoiError>(())
//! ```

pub mod contour;
pub mod error;
pub mod geometry;
pub mod io;
pub mod raster;
pub mod session;
pub mod structure;

pub use contour::{ContourLoop, LoopAccumulation, PixelPoint};
pub use error::{Result, RoiError};
pub use geometry::{RotationConvention, TransformPair, VolumeGeometry};
pub use io::IoError;
pub use raster::RoiRaster;
pub use session::{EditSession, EditState, KeyAction, PointerEvent, SessionConfig};
pub use structure::{ContourData, Roi, RoiContours, RoiId, RoiKey, StructureSet};
