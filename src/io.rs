//! Adapters between files on disk and the contour engine.
//!
//! - [`series`]: geometry of a DICOM image series folder.
//! - [`rtstruct`]: DICOM RT Structure Set read/write.
//! - [`json`]: plain JSON structure files.

pub mod json;
pub mod rtstruct;
pub mod series;

use std::path::PathBuf;

use dicom::core::Tag;
use dicom::object::InMemDicomObject;
use thiserror::Error;

use crate::error::RoiError;

/// Failures at the file boundary.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read DICOM file {path:?}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to write {path:?}: {message}")]
    Write { path: PathBuf, message: String },

    /// A required DICOM attribute is absent or cannot be parsed.
    #[error("Missing or invalid {attribute} in {path:?}")]
    Attribute {
        path: PathBuf,
        attribute: &'static str,
    },

    #[error("No readable DICOM images in {0:?}")]
    NoImages(PathBuf),

    #[error("{count} files exceed the limit of {limit}")]
    TooManyFiles { count: usize, limit: usize },

    #[error("Failed to start worker pool: {0}")]
    Pool(String),

    #[error("Invalid structure file {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Roi(#[from] RoiError),
}

/// Trimmed string value of `tag`, if present and textual.
pub(crate) fn string_attr(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    obj.element(tag)
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|s| s.trim().to_string())
}

/// Backslash-separated numeric values of `tag`.
pub(crate) fn multi_f64_attr(obj: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    string_attr(obj, tag).map(|s| parse_multi_f64(&s))
}

/// Parse a DICOM multi-valued decimal string such as `"0.5\\0.5"`.
///
/// Unparseable components are dropped.
pub fn parse_multi_f64(value: &str) -> Vec<f64> {
    value
        .split('\\')
        .filter_map(|v| v.trim().parse::<f64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_multi_value_with_whitespace() {
        assert_eq!(parse_multi_f64(" 0.5\\0.75 "), vec![0.5, 0.75]);
        assert_eq!(parse_multi_f64("-100.0\\20\\3e1"), vec![-100.0, 20.0, 30.0]);
    }

    #[test]
    fn parse_multi_value_skips_garbage() {
        assert_eq!(parse_multi_f64("1.0\\abc\\2.0"), vec![1.0, 2.0]);
        assert!(parse_multi_f64("").is_empty());
    }

    #[test]
    fn roi_errors_pass_through() {
        let err = IoError::from(RoiError::MalformedContour { len: 4 });
        assert_eq!(err.to_string(), RoiError::MalformedContour { len: 4 }.to_string());
    }
}
