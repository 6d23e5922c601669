//! JSON structure files: optional geometry plus ROI contour records.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::IoError;
use crate::geometry::VolumeGeometry;
use crate::structure::RoiContours;

/// On-disk layout of a structure file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructureFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<VolumeGeometry>,
    #[serde(default)]
    pub rois: Vec<RoiContours>,
}

pub fn read_structure_file(path: &Path) -> Result<StructureFile, IoError> {
    let file = File::open(path).map_err(|source| IoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed, newline terminated.
pub fn write_structure_file(path: &Path, contents: &StructureFile) -> Result<(), IoError> {
    let io_error = |source| IoError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    serde_json::to_writer_pretty(&mut writer, contents).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.write_all(b"\n").map_err(io_error)?;
    writer.flush().map_err(io_error)
}

/// Read only the geometry of a structure file.
pub fn read_geometry(path: &Path) -> Result<VolumeGeometry, IoError> {
    read_structure_file(path)?
        .geometry
        .ok_or_else(|| IoError::Attribute {
            path: path.to_path_buf(),
            attribute: "geometry",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::ContourData;
    use tempfile::TempDir;

    fn sample() -> StructureFile {
        StructureFile {
            geometry: Some(
                VolumeGeometry::axial(64, 48, 10, (0.8, 0.9), 2.5, [-20.0, -30.0, 5.0]).unwrap(),
            ),
            rois: vec![RoiContours {
                number: 1,
                name: "Liver".into(),
                color: [200, 100, 50],
                contours: vec![ContourData {
                    number: 1,
                    points: vec![0.0, 0.0, 5.0, 1.0, 0.0, 5.0, 1.0, 1.0, 5.0],
                }],
            }],
        }
    }

    #[test]
    fn file_survives_write_and_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("structures.json");
        write_structure_file(&path, &sample()).unwrap();
        assert_eq!(read_structure_file(&path).unwrap(), sample());
        assert_eq!(read_geometry(&path).unwrap(), sample().geometry.unwrap());
    }

    #[test]
    fn geometry_is_optional() {
        let parsed: StructureFile =
            serde_json::from_str(r#"{"rois":[{"number":2,"name":"x","color":[1,2,3]}]}"#).unwrap();
        assert!(parsed.geometry.is_none());
        assert!(parsed.rois[0].contours.is_empty());
    }

    #[test]
    fn missing_geometry_is_attribute_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bare.json");
        std::fs::write(&path, "{\"rois\": []}").unwrap();
        assert!(matches!(
            read_geometry(&path),
            Err(IoError::Attribute {
                attribute: "geometry",
                ..
            })
        ));
    }

    #[test]
    fn invalid_json_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_structure_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
