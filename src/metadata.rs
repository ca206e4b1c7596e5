//
// metadata.rs
// Ceph-Tools-rs
//
// Reads the attribute header of a written instance (stopping before Pixel Data) for directory indexing.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use dicom::dictionary_std::tags;
use dicom::object::{DefaultDicomObject, OpenFileOptions};
use serde::Serialize;

use crate::dicom_access::ElementAccess;
use crate::error::ScanError;

/// Attributes mirrored into the Patient/Study/Series/Instance directory records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceHeader {
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub study_uid: String,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub study_id: Option<String>,
    pub study_description: Option<String>,
    pub series_uid: String,
    pub series_number: Option<String>,
    pub modality: Option<String>,
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    pub transfer_syntax: String,
    pub instance_number: Option<String>,
}

/// Pulls the indexing attributes out of any object shape.
///
/// Fails with the name of the first key attribute that is absent.
pub fn extract_instance_header<T: ElementAccess>(obj: &T) -> Result<InstanceHeader, String> {
    Ok(InstanceHeader {
        patient_id: obj.required_str(tags::PATIENT_ID, "Patient ID")?,
        patient_name: obj.element_str(tags::PATIENT_NAME),
        study_uid: obj.required_str(tags::STUDY_INSTANCE_UID, "Study Instance UID")?,
        study_date: obj.element_str(tags::STUDY_DATE),
        study_time: obj.element_str(tags::STUDY_TIME),
        study_id: obj.element_str(tags::STUDY_ID),
        study_description: obj.element_str(tags::STUDY_DESCRIPTION),
        series_uid: obj.required_str(tags::SERIES_INSTANCE_UID, "Series Instance UID")?,
        series_number: obj.element_str(tags::SERIES_NUMBER),
        modality: obj.element_str(tags::MODALITY),
        sop_class_uid: obj.required_str(tags::SOP_CLASS_UID, "SOP Class UID")?,
        sop_instance_uid: obj.required_str(tags::SOP_INSTANCE_UID, "SOP Instance UID")?,
        transfer_syntax: obj
            .transfer_syntax()
            .ok_or_else(|| "missing transfer syntax".to_string())?,
        instance_number: obj.element_str(tags::INSTANCE_NUMBER),
    })
}

pub fn read_instance_header(path: &Path) -> Result<InstanceHeader, ScanError> {
    let obj: DefaultDicomObject = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|e| ScanError {
            path: path.to_path_buf(),
            reason: format!("not a readable DICOM file: {}", e),
        })?;
    extract_instance_header(&obj).map_err(|reason| ScanError {
        path: path.to_path_buf(),
        reason,
    })
}
