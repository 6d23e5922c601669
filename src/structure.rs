//! Named ROIs sharing one volume geometry.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contour::{
    ContourLoop, LoopAccumulation, PixelPoint, dicom_list_to_patient_array,
    extract_polygons, patient_array_to_dicom_list, patient_to_voxel_vector,
    polygon_to_voxel_vector, rasterize_slice, voxel_vector_to_polygon,
};
use crate::error::{Result, RoiError};
use crate::geometry::{RotationConvention, TransformPair, VolumeGeometry};
use crate::raster::RoiRaster;

/// Default outline width for new ROIs.
pub const DEFAULT_LINE_WIDTH: u32 = 2;

/// Stable identity of an ROI within its structure set. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoiId(pub u32);

impl fmt::Display for RoiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ways of addressing an ROI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoiKey {
    /// Case-insensitive name.
    Name(String),
    /// Zero-based position in the current ordering.
    Ordinal(usize),
    Id(RoiId),
}

impl fmt::Display for RoiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Ordinal(n) => write!(f, "ordinal {n}"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// One planar loop in patient coordinates, as stored in a contour sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourData {
    pub number: u32,
    /// Flat `[x0, y0, z0, x1, ...]` in mm.
    pub points: Vec<f64>,
}

/// Interchange record for one structure: identity, color and loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiContours {
    pub number: u32,
    pub name: String,
    pub color: [u8; 3],
    #[serde(default)]
    pub contours: Vec<ContourData>,
}

/// Counts reported by [`StructureSet::import_contours`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub rois: usize,
    pub loops: usize,
    pub skipped: usize,
}

/// One labeled structure and its raster.
#[derive(Debug, Clone)]
pub struct Roi {
    id: RoiId,
    name: String,
    color: [u8; 3],
    line_width: u32,
    tolerance: f64,
    hidden: bool,
    raster: RoiRaster,
    display: Option<(usize, Vec<ContourLoop>)>,
}

impl Roi {
    fn new(id: RoiId, name: String, color: [u8; 3], raster: RoiRaster) -> Self {
        Self {
            id,
            name,
            color,
            line_width: DEFAULT_LINE_WIDTH,
            tolerance: 0.0,
            hidden: false,
            raster,
            display: None,
        }
    }

    pub fn id(&self) -> RoiId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    pub fn set_color(&mut self, color: [u8; 3]) {
        self.color = color;
    }

    pub fn line_width(&self) -> u32 {
        self.line_width
    }

    pub fn set_line_width(&mut self, width: u32) {
        self.line_width = width.max(1);
    }

    /// Douglas-Peucker tolerance in voxels used for display and export.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance.max(0.0);
        self.display = None;
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub fn raster(&self) -> &RoiRaster {
        &self.raster
    }

    /// Mutable raster access; drops any cached display loops.
    pub fn raster_mut(&mut self) -> &mut RoiRaster {
        self.display = None;
        &mut self.raster
    }

    /// Loops of `slice` for display, extracted on first request and cached
    /// until the raster or tolerance changes or another slice is requested.
    pub fn display_loops(&mut self, slice: usize) -> Result<&[ContourLoop]> {
        let stale = !matches!(&self.display, Some((cached, _)) if *cached == slice);
        if stale {
            let loops = extract_polygons(self.raster.slice(slice)?, self.tolerance);
            self.display = Some((slice, loops));
        }
        Ok(match &self.display {
            Some((_, loops)) => loops.as_slice(),
            None => &[],
        })
    }

    /// Loops of every slice, lined up so that index `i` is the `i`-th loop in
    /// scan order on each slice. Slices with fewer loops are padded with
    /// `None` up to the longest slice.
    pub fn loops_by_index(&self) -> Result<Vec<Vec<Option<ContourLoop>>>> {
        let slices = self.raster.dim().2;
        let mut per_slice = Vec::with_capacity(slices);
        for k in 0..slices {
            per_slice.push(extract_polygons(self.raster.slice(k)?, self.tolerance));
        }

        let width = per_slice.iter().map(Vec::len).max().unwrap_or(0);
        Ok(per_slice
            .into_iter()
            .map(|loops| {
                let mut padded: Vec<_> = loops.into_iter().map(Some).collect();
                padded.resize(width, None);
                padded
            })
            .collect())
    }

    /// Whether `display_loops` would be served from cache.
    pub fn has_cached_display(&self, slice: usize) -> bool {
        matches!(&self.display, Some((cached, _)) if *cached == slice)
    }
}

/// Ordered ROIs sharing one geometry, with a single active selection.
///
/// Names are unique ignoring case. Adding a name that already exists removes
/// the previous ROI and appends the new one at the end.
#[derive(Debug, Clone)]
pub struct StructureSet {
    geometry: VolumeGeometry,
    transforms: TransformPair,
    accumulation: LoopAccumulation,
    rois: Vec<Roi>,
    by_name: HashMap<String, RoiId>,
    active: Option<RoiId>,
    next_id: u32,
}

impl StructureSet {
    pub fn new(geometry: VolumeGeometry, convention: RotationConvention) -> Result<Self> {
        let transforms = geometry.transforms(convention)?;
        Ok(Self {
            geometry,
            transforms,
            accumulation: LoopAccumulation::default(),
            rois: Vec::new(),
            by_name: HashMap::new(),
            active: None,
            next_id: 1,
        })
    }

    /// How same-slice loops combine on import.
    pub fn with_accumulation(mut self, accumulation: LoopAccumulation) -> Self {
        self.accumulation = accumulation;
        self
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn transforms(&self) -> &TransformPair {
        &self.transforms
    }

    pub fn rois(&self) -> &[Roi] {
        &self.rois
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    /// Add an empty ROI. See [`StructureSet::add_roi_with_raster`].
    pub fn add_roi(&mut self, name: &str, color: [u8; 3]) -> RoiId {
        let (rows, cols, slices) = self.geometry.dim();
        self.insert(name, color, RoiRaster::new(rows, cols, slices))
    }

    /// Add an ROI with existing voxel data.
    ///
    /// A name collision replaces the previous ROI; if that ROI was active the
    /// new one becomes active. The first ROI added becomes active.
    pub fn add_roi_with_raster(
        &mut self,
        name: &str,
        color: [u8; 3],
        raster: RoiRaster,
    ) -> Result<RoiId> {
        let expected = self.geometry.dim();
        if raster.dim() != expected {
            let (r, c, s) = raster.dim();
            return Err(RoiError::ShapeMismatch {
                expected: vec![expected.0, expected.1, expected.2],
                actual: vec![r, c, s],
            });
        }
        Ok(self.insert(name, color, raster))
    }

    fn insert(&mut self, name: &str, color: [u8; 3], raster: RoiRaster) -> RoiId {
        let id = RoiId(self.next_id);
        self.next_id += 1;

        let key = name.to_lowercase();
        if let Some(previous) = self.by_name.get(&key).copied() {
            tracing::info!(
                "{}; replacing {previous}",
                RoiError::NameCollision(name.to_string())
            );
            self.rois.retain(|roi| roi.id != previous);
            if self.active == Some(previous) {
                self.active = Some(id);
            }
        }

        self.rois.push(Roi::new(id, name.to_string(), color, raster));
        self.by_name.insert(key, id);
        if self.active.is_none() {
            self.active = Some(id);
        }
        id
    }

    /// Remove by identity. The selection clears if the active ROI goes.
    pub fn remove_roi(&mut self, id: RoiId) -> Result<Roi> {
        let position = self
            .rois
            .iter()
            .position(|roi| roi.id == id)
            .ok_or_else(|| RoiError::UnknownRoi(id.to_string()))?;
        let roi = self.rois.remove(position);
        self.by_name.remove(&roi.name.to_lowercase());
        if self.active == Some(id) {
            self.active = None;
        }
        Ok(roi)
    }

    pub fn find(&self, key: &RoiKey) -> Option<RoiId> {
        match key {
            RoiKey::Name(name) => self.by_name.get(&name.to_lowercase()).copied(),
            RoiKey::Ordinal(n) => self.rois.get(*n).map(|roi| roi.id),
            RoiKey::Id(id) => self.rois.iter().any(|roi| roi.id == *id).then_some(*id),
        }
    }

    pub fn get(&self, id: RoiId) -> Option<&Roi> {
        self.rois.iter().find(|roi| roi.id == id)
    }

    pub fn get_mut(&mut self, id: RoiId) -> Option<&mut Roi> {
        self.rois.iter_mut().find(|roi| roi.id == id)
    }

    fn require(&self, id: RoiId) -> Result<&Roi> {
        self.get(id).ok_or_else(|| RoiError::UnknownRoi(id.to_string()))
    }

    /// Make `key` the active ROI. Unknown keys fail and keep the selection.
    pub fn select(&mut self, key: &RoiKey) -> Result<RoiId> {
        let id = self
            .find(key)
            .ok_or_else(|| RoiError::UnknownRoi(key.to_string()))?;
        self.active = Some(id);
        Ok(id)
    }

    pub fn active_id(&self) -> Option<RoiId> {
        self.active
    }

    pub fn active(&self) -> Option<&Roi> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Roi> {
        let id = self.active?;
        self.get_mut(id)
    }

    /// Advance the selection to the next ROI in order, wrapping around.
    pub fn cycle_active(&mut self) -> Option<RoiId> {
        if self.rois.is_empty() {
            return None;
        }
        let next = match self
            .active
            .and_then(|id| self.rois.iter().position(|roi| roi.id == id))
        {
            Some(position) => (position + 1) % self.rois.len(),
            None => 0,
        };
        self.active = Some(self.rois[next].id);
        self.active
    }

    /// Rename in place. Another ROI already holding `name` is removed.
    pub fn rename(&mut self, id: RoiId, name: &str) -> Result<()> {
        let old_key = self.require(id)?.name.to_lowercase();
        let key = name.to_lowercase();

        if let Some(other) = self.by_name.get(&key).copied()
            && other != id
        {
            tracing::info!(
                "{}; replacing {other}",
                RoiError::NameCollision(name.to_string())
            );
            self.rois.retain(|roi| roi.id != other);
            if self.active == Some(other) {
                self.active = Some(id);
            }
        }

        self.by_name.remove(&old_key);
        self.by_name.insert(key, id);
        if let Some(roi) = self.get_mut(id) {
            roi.name = name.to_string();
        }
        Ok(())
    }

    /// Decode patient-space loops into one ROI per record.
    ///
    /// Malformed loops and loops falling outside the volume are skipped with a
    /// warning. Loops on the same slice combine per the set's accumulation.
    pub fn import_contours(&mut self, records: &[RoiContours]) -> Result<ImportReport> {
        let (rows, cols, slices) = self.geometry.dim();
        let mut report = ImportReport::default();

        for record in records {
            let mut per_slice: Vec<Vec<Vec<PixelPoint>>> = vec![Vec::new(); slices];

            for contour in &record.contours {
                let patient = match dicom_list_to_patient_array(&contour.points) {
                    Ok(patient) => patient,
                    Err(err) => {
                        tracing::warn!(
                            "Skipping contour {} of '{}': {err}",
                            contour.number,
                            record.name
                        );
                        report.skipped += 1;
                        continue;
                    }
                };
                if patient.ncols() == 0 {
                    report.skipped += 1;
                    continue;
                }

                let voxel = patient_to_voxel_vector(patient.view(), &self.transforms)?;
                let slice = voxel.row(2).mean().unwrap_or_default().round();
                if slice < 0.0 || slice >= slices as f64 {
                    tracing::warn!(
                        "Skipping contour {} of '{}': slice {slice} outside volume",
                        contour.number,
                        record.name
                    );
                    report.skipped += 1;
                    continue;
                }

                per_slice[slice as usize].push(voxel_vector_to_polygon(voxel.view()));
                report.loops += 1;
            }

            let mut raster = RoiRaster::new(rows, cols, slices);
            for (k, polygons) in per_slice.iter().enumerate() {
                if polygons.is_empty() {
                    continue;
                }
                let mask = rasterize_slice(polygons, rows, cols, self.accumulation);
                raster.write_slice(k, mask.view())?;
            }

            tracing::debug!(
                "Imported '{}' with {} loop(s) over {} slice(s)",
                record.name,
                record.contours.len(),
                raster.occupied_slices().len()
            );
            self.add_roi_with_raster(&record.name, record.color, raster)?;
            report.rois += 1;
        }

        Ok(report)
    }

    /// Trace every occupied slice of every ROI back to patient-space loops.
    ///
    /// Contours are numbered from 1 within each ROI.
    pub fn export_contours(&self) -> Result<Vec<RoiContours>> {
        let mut out = Vec::with_capacity(self.rois.len());

        for roi in &self.rois {
            let mut contours = Vec::new();
            for k in roi.raster.occupied_slices() {
                for contour_loop in extract_polygons(roi.raster.slice(k)?, roi.tolerance) {
                    let voxel = polygon_to_voxel_vector(&contour_loop.points, k as f64);
                    let patient = self.transforms.to_patient(voxel.view())?;
                    contours.push(ContourData {
                        number: contours.len() as u32 + 1,
                        points: patient_array_to_dicom_list(patient.view()),
                    });
                }
            }
            tracing::debug!("Exported '{}' with {} loop(s)", roi.name, contours.len());

            out.push(RoiContours {
                number: roi.id.0,
                name: roi.name.clone(),
                color: roi.color,
                contours,
            });
        }

        Ok(out)
    }

    /// Reflect `source` about the centroid of `reference` along `axis`
    /// (0 = row, 1 = column, 2 = slice).
    ///
    /// Only the bounding cuboid of the source is reflected; the result is a
    /// new raster of the volume's shape carrying the source's on value, and
    /// neither ROI is modified.
    pub fn mirror_about_centroid(
        &self,
        source: RoiId,
        reference: RoiId,
        axis: usize,
    ) -> Result<RoiRaster> {
        let source = self.require(source)?;
        let reference = self.require(reference)?;
        let center = reference
            .raster
            .centroid()
            .ok_or_else(|| RoiError::EmptyRoi(reference.name.clone()))?;

        source.raster.reflected(center, axis)
    }

    /// Mirror and store the result as a new ROI named `name`.
    pub fn add_mirrored_roi(
        &mut self,
        source: RoiId,
        reference: RoiId,
        axis: usize,
        name: &str,
    ) -> Result<RoiId> {
        let raster = self.mirror_about_centroid(source, reference, axis)?;
        let color = self.require(source)?.color;
        self.add_roi_with_raster(name, color, raster)
    }
}

// =============================================================================
// Unit Tests for structure module
// =============================================================================
