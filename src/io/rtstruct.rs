//! DICOM RT Structure Set files.
//!
//! Only the modules that carry ROI identity and planar contours are read or
//! written: Structure Set ROI Sequence, ROI Contour Sequence and RT ROI
//! Observations Sequence. Contour image references are not emitted.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::{StandardDataDictionary, tags};
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject, open_file};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;

use super::{IoError, parse_multi_f64, string_attr};
use crate::structure::{ContourData, RoiContours};

/// RT Structure Set Storage SOP class.
pub const RT_STRUCTURE_SET_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.481.3";

const STRUCTURE_SET_LABEL: Tag = Tag(0x3006, 0x0002);
const STRUCTURE_SET_ROI_SEQUENCE: Tag = Tag(0x3006, 0x0020);
const ROI_NUMBER: Tag = Tag(0x3006, 0x0022);
const REFERENCED_FRAME_OF_REFERENCE_UID: Tag = Tag(0x3006, 0x0024);
const ROI_NAME: Tag = Tag(0x3006, 0x0026);
const ROI_DISPLAY_COLOR: Tag = Tag(0x3006, 0x002A);
const ROI_GENERATION_ALGORITHM: Tag = Tag(0x3006, 0x0036);
const ROI_CONTOUR_SEQUENCE: Tag = Tag(0x3006, 0x0039);
const CONTOUR_SEQUENCE: Tag = Tag(0x3006, 0x0040);
const CONTOUR_GEOMETRIC_TYPE: Tag = Tag(0x3006, 0x0042);
const NUMBER_OF_CONTOUR_POINTS: Tag = Tag(0x3006, 0x0046);
const CONTOUR_NUMBER: Tag = Tag(0x3006, 0x0048);
const CONTOUR_DATA: Tag = Tag(0x3006, 0x0050);
const RT_ROI_OBSERVATIONS_SEQUENCE: Tag = Tag(0x3006, 0x0080);
const OBSERVATION_NUMBER: Tag = Tag(0x3006, 0x0082);
const REFERENCED_ROI_NUMBER: Tag = Tag(0x3006, 0x0084);
const RT_ROI_INTERPRETED_TYPE: Tag = Tag(0x3006, 0x00A4);

/// Identity written alongside the contours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtStructMeta {
    pub label: String,
    pub frame_of_reference_uid: Option<String>,
    pub study_instance_uid: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
}

impl Default for RtStructMeta {
    fn default() -> Self {
        Self {
            label: "ROI".to_string(),
            frame_of_reference_uid: None,
            study_instance_uid: None,
            patient_id: None,
            patient_name: None,
        }
    }
}

/// Read every ROI with its display color and contour loops.
///
/// ROIs listed in the contour sequence but missing from the structure set
/// sequence are named `ROI <number>`. Contour data is kept as stored; length
/// checks happen on import.
pub fn read_rtstruct(path: &Path) -> Result<Vec<RoiContours>, IoError> {
    let obj = open_file(path).map_err(|e| IoError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let names: Vec<(u32, String)> = sequence_items(&obj, STRUCTURE_SET_ROI_SEQUENCE)
        .iter()
        .filter_map(|item| {
            let number = string_attr(item, ROI_NUMBER)?.parse::<u32>().ok()?;
            Some((number, string_attr(item, ROI_NAME).unwrap_or_default()))
        })
        .collect();

    let Some(contour_items) = obj
        .element(ROI_CONTOUR_SEQUENCE)
        .ok()
        .and_then(|elem| elem.items())
    else {
        return Err(IoError::Attribute {
            path: path.to_path_buf(),
            attribute: "ROIContourSequence",
        });
    };

    let mut records = Vec::with_capacity(contour_items.len());
    for (index, item) in contour_items.iter().enumerate() {
        let number = string_attr(item, REFERENCED_ROI_NUMBER)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(index as u32 + 1);
        let name = names
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| format!("ROI {number}"));
        let color = string_attr(item, ROI_DISPLAY_COLOR)
            .map(|s| parse_color(&s))
            .unwrap_or([255, 0, 0]);

        let contours = sequence_items(item, CONTOUR_SEQUENCE)
            .iter()
            .enumerate()
            .map(|(k, contour)| ContourData {
                number: string_attr(contour, CONTOUR_NUMBER)
                    .and_then(|s| s.parse::<u32>().ok())
                    .unwrap_or(k as u32 + 1),
                points: string_attr(contour, CONTOUR_DATA)
                    .map(|s| parse_multi_f64(&s))
                    .unwrap_or_default(),
            })
            .collect();

        records.push(RoiContours {
            number,
            name,
            color,
            contours,
        });
    }

    tracing::debug!("Read {} ROI(s) from {:?}", records.len(), path);
    Ok(records)
}

/// Write `records` as a minimal RT Structure Set.
///
/// Every loop is stored as `CLOSED_PLANAR`; contour numbers are taken from
/// the records, so they restart per ROI.
pub fn write_rtstruct(
    path: &Path,
    records: &[RoiContours],
    meta: &RtStructMeta,
) -> Result<(), IoError> {
    let write_error = |message: String| IoError::Write {
        path: path.to_path_buf(),
        message,
    };

    let sop_instance_uid = generate_uid(1);
    let file_meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid(RT_STRUCTURE_SET_STORAGE)
        .media_storage_sop_instance_uid(sop_instance_uid.as_str())
        .build()
        .map_err(|e| write_error(e.to_string()))?;

    let mut file_obj =
        FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, file_meta);

    put_str(&mut file_obj, tags::SOP_CLASS_UID, VR::UI, RT_STRUCTURE_SET_STORAGE);
    put_str(&mut file_obj, tags::SOP_INSTANCE_UID, VR::UI, &sop_instance_uid);
    put_str(&mut file_obj, tags::MODALITY, VR::CS, "RTSTRUCT");
    put_str(&mut file_obj, tags::SERIES_INSTANCE_UID, VR::UI, &generate_uid(2));
    put_str(
        &mut file_obj,
        tags::STUDY_INSTANCE_UID,
        VR::UI,
        &meta
            .study_instance_uid
            .clone()
            .unwrap_or_else(|| generate_uid(3)),
    );
    put_str(
        &mut file_obj,
        tags::PATIENT_ID,
        VR::LO,
        meta.patient_id.as_deref().unwrap_or_default(),
    );
    put_str(
        &mut file_obj,
        tags::PATIENT_NAME,
        VR::PN,
        meta.patient_name.as_deref().unwrap_or_default(),
    );
    put_str(&mut file_obj, STRUCTURE_SET_LABEL, VR::SH, &meta.label);

    let frame_uid = meta.frame_of_reference_uid.clone().unwrap_or_default();
    let mut roi_items = Vec::with_capacity(records.len());
    let mut contour_items = Vec::with_capacity(records.len());
    let mut observation_items = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let number = if record.number == 0 {
            index as u32 + 1
        } else {
            record.number
        };

        let mut roi = InMemDicomObject::new_empty();
        put_str(&mut roi, ROI_NUMBER, VR::IS, &number.to_string());
        put_str(&mut roi, REFERENCED_FRAME_OF_REFERENCE_UID, VR::UI, &frame_uid);
        put_str(&mut roi, ROI_NAME, VR::LO, &record.name);
        put_str(&mut roi, ROI_GENERATION_ALGORITHM, VR::CS, "MANUAL");
        roi_items.push(roi);

        let mut loops = Vec::with_capacity(record.contours.len());
        for contour in &record.contours {
            let mut item = InMemDicomObject::new_empty();
            put_str(&mut item, CONTOUR_NUMBER, VR::IS, &contour.number.to_string());
            put_str(&mut item, CONTOUR_GEOMETRIC_TYPE, VR::CS, "CLOSED_PLANAR");
            put_str(
                &mut item,
                NUMBER_OF_CONTOUR_POINTS,
                VR::IS,
                &(contour.points.len() / 3).to_string(),
            );
            put_strs(
                &mut item,
                CONTOUR_DATA,
                VR::DS,
                contour.points.iter().map(|v| format_ds(*v)).collect(),
            );
            loops.push(item);
        }

        let mut roi_contour = InMemDicomObject::new_empty();
        put_strs(
            &mut roi_contour,
            ROI_DISPLAY_COLOR,
            VR::IS,
            record.color.iter().map(u8::to_string).collect(),
        );
        put_sequence(&mut roi_contour, CONTOUR_SEQUENCE, loops);
        put_str(&mut roi_contour, REFERENCED_ROI_NUMBER, VR::IS, &number.to_string());
        contour_items.push(roi_contour);

        let mut observation = InMemDicomObject::new_empty();
        put_str(&mut observation, OBSERVATION_NUMBER, VR::IS, &number.to_string());
        put_str(&mut observation, REFERENCED_ROI_NUMBER, VR::IS, &number.to_string());
        put_str(&mut observation, RT_ROI_INTERPRETED_TYPE, VR::CS, "");
        observation_items.push(observation);
    }

    put_sequence(&mut file_obj, STRUCTURE_SET_ROI_SEQUENCE, roi_items);
    put_sequence(&mut file_obj, ROI_CONTOUR_SEQUENCE, contour_items);
    put_sequence(&mut file_obj, RT_ROI_OBSERVATIONS_SEQUENCE, observation_items);

    file_obj
        .write_to_file(path)
        .map_err(|e| write_error(e.to_string()))?;

    tracing::debug!("Wrote {} ROI(s) to {:?}", records.len(), path);
    Ok(())
}

fn sequence_items(obj: &InMemDicomObject, tag: Tag) -> &[InMemDicomObject] {
    obj.element(tag)
        .ok()
        .and_then(|elem| elem.items())
        .unwrap_or_default()
}

fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

fn put_strs(obj: &mut InMemDicomObject, tag: Tag, vr: VR, values: Vec<String>) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::Strs(values.into())));
}

fn put_sequence(obj: &mut InMemDicomObject, tag: Tag, items: Vec<InMemDicomObject>) {
    obj.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
}

/// `"r\g\b"` to a color; missing or invalid components become 0.
fn parse_color(value: &str) -> [u8; 3] {
    let mut color = [0u8; 3];
    for (slot, part) in color.iter_mut().zip(value.split('\\')) {
        *slot = part.trim().parse::<f64>().map_or(0, |v| v.clamp(0.0, 255.0) as u8);
    }
    color
}

/// Decimal string short enough for the 16 byte DS limit at mm precision.
fn format_ds(value: f64) -> String {
    let text = format!("{value:.3}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

fn generate_uid(suffix: u32) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("2.25.{nanos}{}{suffix}", std::process::id())
}

// =============================================================================
// Unit Tests for rtstruct module
// =============================================================================
