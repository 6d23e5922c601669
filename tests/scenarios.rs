//! End-to-end behaviour of the contour engine through the library API.
//!
//! These run without any DICOM files: volumes are built from synthetic
//! geometry and loops are drawn directly.

use ndarray::{Array2, array};

use roi_toolbox::contour::{extract_polygons, rasterize_slice};
use roi_toolbox::raster::FILL_VALUE;
use roi_toolbox::session::Notice;
use roi_toolbox::{
    ContourData, EditSession, KeyAction, LoopAccumulation, PointerEvent, RoiContours, RoiError,
    RoiRaster, RotationConvention, SessionConfig, StructureSet, VolumeGeometry,
};

fn oblique_geometry() -> VolumeGeometry {
    VolumeGeometry::new(
        64,
        48,
        12,
        (0.7, 0.9),
        2.5,
        [0.6, 0.8, 0.0],
        [-0.8, 0.6, 0.0],
        [-120.0, 35.5, 410.0],
    )
    .unwrap()
}

fn axial_set(rows: usize, cols: usize, slices: usize) -> StructureSet {
    let geometry = VolumeGeometry::axial(rows, cols, slices, (1.0, 1.0), 2.0, [0.0; 3]).unwrap();
    StructureSet::new(geometry, RotationConvention::Normal).unwrap()
}

fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64, z: f64) -> Vec<f64> {
    vec![x0, y0, z, x1, y0, z, x1, y1, z, x0, y1, z]
}

// =============================================================================
// Coordinate Transform Scenarios
// =============================================================================

mod transform_scenarios {
    use super::*;

    #[test]
    fn patient_points_survive_a_round_trip_under_both_conventions() {
        let points = array![
            [-120.0, 0.0, 17.25, 300.5],
            [35.5, -44.0, 0.125, 99.0],
            [410.0, 412.5, 500.0, -3.0]
        ];

        for convention in [RotationConvention::Normal, RotationConvention::Reversed] {
            let transforms = oblique_geometry().transforms(convention).unwrap();
            let voxel = transforms.to_voxel(points.view()).unwrap();
            let back = transforms.to_patient(voxel.view()).unwrap();
            for (a, b) in points.iter().zip(back.iter()) {
                assert!((a - b).abs() < 1e-6, "{convention:?}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn origin_maps_to_the_first_voxel() {
        let geometry = oblique_geometry();
        let transforms = geometry.transforms(RotationConvention::Normal).unwrap();
        let origin = Array2::from_shape_vec((3, 1), geometry.origin.to_vec()).unwrap();
        let voxel = transforms.to_voxel(origin.view()).unwrap();
        for v in voxel.iter() {
            assert!(v.abs() < 1e-9);
        }
    }
}

// =============================================================================
// Contour Codec Scenarios
// =============================================================================

mod codec_scenarios {
    use super::*;

    #[test]
    fn rasterize_extract_rasterize_is_stable() {
        // L-shaped region with a concave corner
        let polygon = vec![(4, 4), (20, 4), (20, 10), (10, 10), (10, 24), (4, 24)];
        let first = rasterize_slice(&[polygon], 32, 32, LoopAccumulation::Union);

        let loops = extract_polygons(first.view(), 0.0);
        assert_eq!(loops.len(), 1);
        let traced: Vec<_> = loops.into_iter().map(|l| l.points).collect();
        let second = rasterize_slice(&traced, 32, 32, LoopAccumulation::Union);

        assert_eq!(first, second);
    }

    #[test]
    fn painted_disc_traces_to_one_loop_around_its_bounds() {
        let mut raster = RoiRaster::new(100, 100, 1);
        raster.paint_circle(0, 50, 50, 10, FILL_VALUE).unwrap();

        let loops = extract_polygons(raster.slice(0).unwrap(), 0.0);
        assert_eq!(loops.len(), 1);
        let ((x0, y0), (x1, y1)) = loops[0].bounding_box().unwrap();
        for (actual, expected) in [(x0, 40), (y0, 40), (x1, 60), (y1, 60)] {
            assert!((actual - expected).abs() <= 1, "{actual} vs {expected}");
        }
    }
}

// =============================================================================
// Raster Editing Scenarios
// =============================================================================

mod raster_scenarios {
    use super::*;

    #[test]
    fn erase_undoes_paint_on_an_empty_slice() {
        let mut raster = RoiRaster::new(40, 40, 3);
        raster.paint_circle(1, 20, 20, 7, FILL_VALUE).unwrap();
        assert!(!raster.is_empty());

        raster.paint_circle(1, 20, 20, 7, 0).unwrap();
        assert!(raster.is_empty());
    }

    #[test]
    fn dilate_then_erode_stays_within_one_element_of_the_disc() {
        let mut raster = RoiRaster::new(100, 100, 1);
        raster.paint_circle(0, 50, 50, 20, FILL_VALUE).unwrap();
        let original = raster.clone();

        let size = raster.structuring_element_size();
        assert_eq!(size, 2);
        raster.dilate(0, size).unwrap();
        raster.erode(0, size).unwrap();

        let margin = f64::from(size) + 1.0;
        for ((r, c, _), &v) in raster.data().indexed_iter() {
            let d = ((r as f64 - 50.0).powi(2) + (c as f64 - 50.0).powi(2)).sqrt();
            if d < 20.0 - margin {
                assert_eq!(v, FILL_VALUE, "interior voxel ({r}, {c}) lost");
            } else if d > 20.0 + margin {
                assert_eq!(v, 0, "exterior voxel ({r}, {c}) gained");
            }
        }
        let diff = (raster.count() as i64 - original.count() as i64).abs();
        assert!(diff < original.count() as i64 / 10);
    }

    #[test]
    fn neighbor_union_at_the_first_slice_is_refused_untouched() {
        let mut raster = RoiRaster::new(10, 10, 3);
        raster.paint_circle(0, 5, 5, 2, FILL_VALUE).unwrap();
        raster.paint_circle(1, 3, 3, 2, FILL_VALUE).unwrap();
        let before = raster.clone();

        let err = raster.union_with_neighbor(0, -1).unwrap_err();
        assert_eq!(
            err,
            RoiError::BoundaryReached {
                slice: 0,
                direction: -1
            }
        );
        assert_eq!(raster.data(), before.data());
    }
}

// =============================================================================
// Structure Set Scenarios
// =============================================================================

mod structure_scenarios {
    use super::*;

    #[test]
    fn mirror_reflects_rows_about_the_reference_centroid() {
        let mut set = axial_set(100, 100, 10);

        let mut reference = RoiRaster::new(100, 100, 10);
        for k in 4..=6 {
            reference.paint_circle(k, 50, 50, 3, FILL_VALUE).unwrap();
        }
        let reference = set.add_roi_with_raster("Body", [0, 0, 255], reference).unwrap();

        let mut source = RoiRaster::new(100, 100, 10);
        source
            .stroke_polyline(5, &[(30, 10), (30, 20)], 0, FILL_VALUE)
            .unwrap();
        let source = set.add_roi_with_raster("Left", [255, 0, 0], source).unwrap();

        let mirrored = set.add_mirrored_roi(source, reference, 0, "Right").unwrap();
        let raster = set.get(mirrored).unwrap().raster();

        assert_eq!(raster.bounding_cuboid(), Some(([80, 30, 5], [90, 30, 5])));
        assert_eq!(raster.count(), 11);
        assert_eq!(set.get(mirrored).unwrap().color(), [255, 0, 0]);
    }

    #[test]
    fn mirroring_about_an_empty_roi_fails() {
        let mut set = axial_set(20, 20, 2);
        let empty = set.add_roi("Empty", [1, 2, 3]);
        let mut raster = RoiRaster::new(20, 20, 2);
        raster.paint_circle(0, 5, 5, 2, FILL_VALUE).unwrap();
        let source = set.add_roi_with_raster("Spot", [4, 5, 6], raster).unwrap();

        let err = set.mirror_about_centroid(source, empty, 1).unwrap_err();
        assert_eq!(err, RoiError::EmptyRoi("Empty".into()));
    }

    #[test]
    fn rectangles_survive_import_and_export_on_every_slice() {
        let mut set = axial_set(32, 32, 4);
        let contours = (0..4)
            .map(|k| ContourData {
                number: k + 1,
                points: rectangle(5.0, 8.0, 15.0, 20.0, 2.0 * f64::from(k)),
            })
            .collect();
        let records = vec![RoiContours {
            number: 1,
            name: "Box".into(),
            color: [10, 20, 30],
            contours,
        }];

        let report = set.import_contours(&records).unwrap();
        assert_eq!((report.rois, report.loops, report.skipped), (1, 4, 0));

        let exported = set.export_contours().unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].contours.len(), 4);

        for (k, contour) in exported[0].contours.iter().enumerate() {
            assert_eq!(contour.number, k as u32 + 1);
            let xs: Vec<f64> = contour.points.iter().step_by(3).copied().collect();
            let ys: Vec<f64> = contour.points.iter().skip(1).step_by(3).copied().collect();
            let zs: Vec<f64> = contour.points.iter().skip(2).step_by(3).copied().collect();

            let min = |v: &[f64]| v.iter().copied().fold(f64::INFINITY, f64::min);
            let max = |v: &[f64]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            assert!((min(&xs) - 5.0).abs() < 1e-9);
            assert!((max(&xs) - 15.0).abs() < 1e-9);
            assert!((min(&ys) - 8.0).abs() < 1e-9);
            assert!((max(&ys) - 20.0).abs() < 1e-9);
            assert!(zs.iter().all(|z| (z - 2.0 * k as f64).abs() < 1e-9));
        }
    }
}

// =============================================================================
// Editing Session Scenarios
// =============================================================================

mod session_scenarios {
    use super::*;

    #[test]
    fn brush_stroke_then_inverted_press_erases() {
        let mut set = axial_set(60, 60, 3);
        set.add_roi("Tumor", [255, 255, 0]);
        let mut session = EditSession::new(SessionConfig {
            brush_radius: 4,
            ..SessionConfig::default()
        });

        session
            .handle(&PointerEvent::Enter { x: 10, y: 10 }, &mut set)
            .unwrap();
        session
            .handle(&PointerEvent::Press { x: 10, y: 10 }, &mut set)
            .unwrap();
        session
            .handle(&PointerEvent::Move { x: 30, y: 10 }, &mut set)
            .unwrap();
        session.handle(&PointerEvent::Release, &mut set).unwrap();

        let raster = set.active().unwrap().raster();
        assert!(raster.is_inside(0, 20, 10).unwrap());
        assert!(!raster.is_inside(0, 20, 30).unwrap());
        assert!(raster.slice_is_empty(1).unwrap());

        // inside the band a press pushes outward, so erasing needs the invert key
        session
            .handle(&PointerEvent::InvertKey { held: true }, &mut set)
            .unwrap();
        session
            .handle(&PointerEvent::Press { x: 20, y: 10 }, &mut set)
            .unwrap();
        session.handle(&PointerEvent::Release, &mut set).unwrap();
        assert!(!set.active().unwrap().raster().is_inside(0, 20, 10).unwrap());
    }

    #[test]
    fn merging_past_the_last_slice_reports_the_boundary() {
        let mut set = axial_set(10, 10, 2);
        set.add_roi("Organ", [0, 255, 0]);
        let mut session = EditSession::default();

        assert_eq!(session.key(KeyAction::NextSlice, &mut set).unwrap(), None);
        assert_eq!(session.slice(), 1);

        let notice = session.key(KeyAction::UnionNeighbor(1), &mut set).unwrap();
        assert_eq!(
            notice,
            Some(Notice::BoundaryReached {
                slice: 1,
                direction: 1
            })
        );
    }
}
