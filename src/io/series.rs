//! Geometry of a folder of single-frame DICOM images.
//!
//! Headers are read on a bounded rayon pool. Files that cannot be opened or
//! lack geometry attributes are reported and skipped, never fatal. Slices are
//! sorted along the slice normal before the volume geometry is derived.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use dicom::dictionary_std::tags;
use dicom::object::open_file;
use rayon::prelude::*;

use super::{IoError, multi_f64_attr, string_attr};
use crate::geometry::{VolumeGeometry, cross, dot};

/// Hard cap on files per series folder.
pub const MAX_SERIES_FILES: usize = 4096;

/// Modality bucket for files whose modality cannot be read.
pub const UNKNOWN_MODALITY: &str = "unknown";

/// Geometry-relevant attributes of one image file.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceHeader {
    pub path: PathBuf,
    pub modality: String,
    pub sop_instance_uid: Option<String>,
    pub series_instance_uid: Option<String>,
    pub frame_of_reference_uid: Option<String>,
    pub rows: usize,
    pub cols: usize,
    /// `(row, column)` spacing in mm.
    pub pixel_spacing: (f64, f64),
    pub orientation: [f64; 6],
    pub position: [f64; 3],
    pub slice_thickness: Option<f64>,
}

/// A file that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// The readable slices of a folder, sorted along the slice normal.
#[derive(Debug, Clone)]
pub struct ImageSeries {
    pub slices: Vec<SliceHeader>,
    pub geometry: VolumeGeometry,
    pub failures: Vec<FileFailure>,
    /// File count per modality, failed files included.
    pub modalities: BTreeMap<String, usize>,
}

impl ImageSeries {
    /// SOP Instance UIDs in slice order.
    pub fn instance_uids(&self) -> Vec<Option<String>> {
        self.slices
            .iter()
            .map(|slice| slice.sop_instance_uid.clone())
            .collect()
    }

    /// Frame of reference shared by the series, if any slice carries one.
    pub fn frame_of_reference_uid(&self) -> Option<&str> {
        self.slices
            .iter()
            .find_map(|slice| slice.frame_of_reference_uid.as_deref())
    }
}

/// Every `.dcm` file directly inside `dir`, sorted by path.
pub fn list_dicom_files(dir: &Path) -> Result<Vec<PathBuf>, IoError> {
    let entries = fs::read_dir(dir).map_err(|source| IoError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Load slice headers from `dir` using at most `jobs` worker threads
/// (`None` = one per available core).
pub fn load_series(dir: &Path, jobs: Option<usize>) -> Result<ImageSeries, IoError> {
    let files = list_dicom_files(dir)?;
    if files.len() > MAX_SERIES_FILES {
        return Err(IoError::TooManyFiles {
            count: files.len(),
            limit: MAX_SERIES_FILES,
        });
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()
        .map_err(|e| IoError::Pool(e.to_string()))?;
    let results: Vec<HeaderResult> =
        pool.install(|| files.par_iter().map(|path| read_header(path)).collect());

    let mut modalities: BTreeMap<String, usize> = BTreeMap::new();
    let mut failures = Vec::new();
    let mut slices = Vec::new();
    for result in results {
        match result {
            HeaderResult::Ok(header) => {
                *modalities.entry(header.modality.clone()).or_insert(0) += 1;
                slices.push(*header);
            }
            HeaderResult::Failed { modality, failure } => {
                tracing::warn!("Skipping {:?}: {}", failure.path, failure.message);
                *modalities.entry(modality).or_insert(0) += 1;
                failures.push(failure);
            }
        }
    }

    let Some(first) = slices.first().cloned() else {
        return Err(IoError::NoImages(dir.to_path_buf()));
    };

    // keep only slices matching the first one's grid and orientation
    let (kept, mismatched): (Vec<_>, Vec<_>) = slices.into_iter().partition(|s| {
        s.rows == first.rows
            && s.cols == first.cols
            && s.orientation
                .iter()
                .zip(first.orientation.iter())
                .all(|(a, b)| (a - b).abs() < 1e-4)
    });
    for slice in mismatched {
        let failure = FileFailure {
            path: slice.path,
            message: "grid or orientation differs from the rest of the series".to_string(),
        };
        tracing::warn!("Skipping {:?}: {}", failure.path, failure.message);
        failures.push(failure);
    }

    let mut slices = kept;
    let normal = cross(
        [first.orientation[0], first.orientation[1], first.orientation[2]],
        [first.orientation[3], first.orientation[4], first.orientation[5]],
    );
    slices.sort_by(|a, b| dot(a.position, normal).total_cmp(&dot(b.position, normal)));

    let positions: Vec<[f64; 3]> = slices.iter().map(|s| s.position).collect();
    let geometry = VolumeGeometry::from_dicom(
        first.rows,
        first.cols,
        first.pixel_spacing,
        first.orientation,
        &positions,
        first.slice_thickness,
    )?;

    tracing::debug!(
        "Loaded {} slice(s) from {:?}, {} skipped",
        slices.len(),
        dir,
        failures.len()
    );

    Ok(ImageSeries {
        slices,
        geometry,
        failures,
        modalities,
    })
}

enum HeaderResult {
    Ok(Box<SliceHeader>),
    Failed {
        modality: String,
        failure: FileFailure,
    },
}

fn read_header(path: &Path) -> HeaderResult {
    let obj = match open_file(path) {
        Ok(obj) => obj,
        Err(e) => {
            return HeaderResult::Failed {
                modality: UNKNOWN_MODALITY.to_string(),
                failure: FileFailure {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                },
            };
        }
    };

    let modality = string_attr(&obj, tags::MODALITY)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| UNKNOWN_MODALITY.to_string());

    let fail = |attribute: &str| HeaderResult::Failed {
        modality: modality.clone(),
        failure: FileFailure {
            path: path.to_path_buf(),
            message: format!("missing or invalid {attribute}"),
        },
    };

    let Some(rows) = obj
        .element(tags::ROWS)
        .ok()
        .and_then(|e| e.to_int::<usize>().ok())
    else {
        return fail("Rows");
    };
    let Some(cols) = obj
        .element(tags::COLUMNS)
        .ok()
        .and_then(|e| e.to_int::<usize>().ok())
    else {
        return fail("Columns");
    };
    let spacing = multi_f64_attr(&obj, tags::PIXEL_SPACING).unwrap_or_default();
    let [row_spacing, col_spacing] = spacing[..] else {
        return fail("PixelSpacing");
    };
    let Some(orientation) = multi_f64_attr(&obj, tags::IMAGE_ORIENTATION_PATIENT)
        .and_then(|v| <[f64; 6]>::try_from(v.as_slice()).ok())
    else {
        return fail("ImageOrientationPatient");
    };
    let Some(position) = multi_f64_attr(&obj, tags::IMAGE_POSITION_PATIENT)
        .and_then(|v| <[f64; 3]>::try_from(v.as_slice()).ok())
    else {
        return fail("ImagePositionPatient");
    };

    HeaderResult::Ok(Box::new(SliceHeader {
        path: path.to_path_buf(),
        modality: modality.clone(),
        sop_instance_uid: string_attr(&obj, tags::SOP_INSTANCE_UID),
        series_instance_uid: string_attr(&obj, tags::SERIES_INSTANCE_UID),
        frame_of_reference_uid: string_attr(&obj, tags::FRAME_OF_REFERENCE_UID),
        rows,
        cols,
        pixel_spacing: (row_spacing, col_spacing),
        orientation,
        position,
        slice_thickness: multi_f64_attr(&obj, tags::SLICE_THICKNESS)
            .and_then(|v| v.first().copied()),
    }))
}

// =============================================================================
// Unit Tests for series module
// =============================================================================
