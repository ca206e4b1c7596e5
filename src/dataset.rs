//
// dataset.rs
// Ceph-Tools-rs
//
// Renders cephalograms and fiducial sets into in-memory DICOM data sets (DX for processing, Spatial Fiducials).
//
// Thales Matheus Mendonça Santos - November 2025

use chrono::{Local, NaiveDate, NaiveTime};
use dicom::core::value::{DataSetSequence, Value};
use dicom::core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::InMemDicomObject;

use crate::cephalogram::{CephalogramImage, PatientModule, StudyModule};
use crate::codes::{CodeItem, CHARACTER_SET, HEAD_NOS, PATIENT_ERECT};
use crate::error::{IdentifierError, Result};
use crate::fiducial::FiducialSet;
use crate::uid::{Identity, InstanceReference, Uid};

/// Something that serializes into a composite DICOM instance.
pub trait ToDataset {
    fn sop_class_uid(&self) -> &'static str;

    fn sop_instance_uid(&self) -> Option<&Uid>;

    /// Builds the full attribute set, excluding Pixel Data.
    ///
    /// Fails when identifiers have not been assigned yet.
    fn to_dataset(&self) -> Result<InMemDicomObject>;
}

impl ToDataset for CephalogramImage {
    fn sop_class_uid(&self) -> &'static str {
        uids::DIGITAL_X_RAY_IMAGE_STORAGE_FOR_PROCESSING
    }

    fn sop_instance_uid(&self) -> Option<&Uid> {
        self.identity().sop.as_ref()
    }

    fn to_dataset(&self) -> Result<InMemDicomObject> {
        let (study_uid, series_uid, sop_uid) = assigned(self.identity())?;
        let mut obj = InMemDicomObject::new_empty();

        put_sop_common(&mut obj, self.sop_class_uid(), sop_uid);
        put_strs(&mut obj, tags::IMAGE_TYPE, VR::CS, ["ORIGINAL", "PRIMARY"]);
        put_patient(&mut obj, &self.patient);
        put_study(&mut obj, &self.study, study_uid);

        // DX Series
        put_str(&mut obj, tags::MODALITY, VR::CS, "DX");
        put_str(&mut obj, tags::SERIES_INSTANCE_UID, VR::UI, series_uid.as_str());
        put_int(&mut obj, tags::SERIES_NUMBER, self.series.series_number);
        put_str(&mut obj, tags::PRESENTATION_INTENT_TYPE, VR::CS, "FOR PROCESSING");
        put_str(&mut obj, tags::MANUFACTURER, VR::LO, "");

        // DX Image
        put_int(&mut obj, tags::INSTANCE_NUMBER, self.series.instance_number);
        match &self.patient_orientation {
            Some((row, column)) => {
                put_strs(&mut obj, tags::PATIENT_ORIENTATION, VR::CS, [row.as_str(), column.as_str()])
            }
            None => put_empty(&mut obj, tags::PATIENT_ORIENTATION, VR::CS),
        }
        put_date(&mut obj, tags::CONTENT_DATE, self.study.date);
        put_time(&mut obj, tags::CONTENT_TIME, self.study.time);
        let lossy = if self.pixel.is_lossy() { "01" } else { "00" };
        put_str(&mut obj, tags::LOSSY_IMAGE_COMPRESSION, VR::CS, lossy);

        // Image Pixel
        put_u16(&mut obj, tags::SAMPLES_PER_PIXEL, 1);
        put_str(&mut obj, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
        put_u16(&mut obj, tags::ROWS, self.pixel.rows);
        put_u16(&mut obj, tags::COLUMNS, self.pixel.columns);
        put_u16(&mut obj, tags::BITS_ALLOCATED, 8);
        put_u16(&mut obj, tags::BITS_STORED, 8);
        put_u16(&mut obj, tags::HIGH_BIT, 7);
        put_u16(&mut obj, tags::PIXEL_REPRESENTATION, 0);

        // DX Detector
        if let Some(spacing) = self.pixel.pixel_spacing_mm {
            let pair = format!("{}\\{}", ds(spacing), ds(spacing));
            put_str(&mut obj, tags::IMAGER_PIXEL_SPACING, VR::DS, pair.clone());
            put_str(&mut obj, tags::PIXEL_SPACING, VR::DS, pair);
        }

        // DX Positioning
        let positioning = &self.positioning;
        let view = positioning.view();
        put_str(&mut obj, tags::VIEW_POSITION, VR::CS, view.code_string());
        put_seq(&mut obj, tags::VIEW_CODE_SEQUENCE, vec![code_item(&view.view_code())]);
        put_str(&mut obj, tags::POSITIONER_TYPE, VR::CS, "CEPHALOSTAT");
        put_str(&mut obj, tags::POSITIONER_PRIMARY_ANGLE, VR::DS, ds(view.primary_angle()));
        put_str(&mut obj, tags::POSITIONER_SECONDARY_ANGLE, VR::DS, ds(view.secondary_angle()));
        put_str(&mut obj, tags::DISTANCE_SOURCE_TO_DETECTOR, VR::DS, ds(positioning.source_to_detector_mm()));
        put_str(&mut obj, tags::DISTANCE_SOURCE_TO_PATIENT, VR::DS, ds(positioning.source_to_patient_mm()));
        put_str(
            &mut obj,
            tags::ESTIMATED_RADIOGRAPHIC_MAGNIFICATION_FACTOR,
            VR::DS,
            ds(positioning.magnification()),
        );
        put_str(&mut obj, tags::TABLE_TYPE, VR::CS, "FIXED");
        put_seq(&mut obj, tags::PATIENT_ORIENTATION_CODE_SEQUENCE, vec![code_item(&PATIENT_ERECT)]);

        // DX Anatomy Imaged
        put_str(&mut obj, tags::IMAGE_LATERALITY, VR::CS, "U");
        put_seq(&mut obj, tags::ANATOMIC_REGION_SEQUENCE, vec![code_item(&HEAD_NOS)]);
        put_str(&mut obj, tags::BODY_PART_EXAMINED, VR::CS, "SKULL");

        if let Some(other) = self.other_image() {
            put_seq(&mut obj, tags::REFERENCED_IMAGE_SEQUENCE, vec![reference_item(other)]);
        }
        if let Some(fiducials) = self.fiducial_reference() {
            put_seq(&mut obj, tags::REFERENCED_INSTANCE_SEQUENCE, vec![reference_item(fiducials)]);
        }

        Ok(obj)
    }
}

impl ToDataset for FiducialSet {
    fn sop_class_uid(&self) -> &'static str {
        uids::SPATIAL_FIDUCIALS_STORAGE
    }

    fn sop_instance_uid(&self) -> Option<&Uid> {
        self.identity().sop.as_ref()
    }

    fn to_dataset(&self) -> Result<InMemDicomObject> {
        let (study_uid, series_uid, sop_uid) = assigned(self.identity())?;
        let referenced: Vec<InstanceReference> = self
            .referenced_images()
            .iter()
            .cloned()
            .map(InstanceReference::image)
            .collect();
        let Some(first) = referenced.first() else {
            return Err(IdentifierError::Unassigned("referenced image").into());
        };

        let mut obj = InMemDicomObject::new_empty();
        put_sop_common(&mut obj, self.sop_class_uid(), sop_uid);
        put_patient(&mut obj, &self.patient);
        put_study(&mut obj, &self.study, study_uid);

        // Spatial Fiducials Series
        put_str(&mut obj, tags::MODALITY, VR::CS, "FID");
        put_str(&mut obj, tags::SERIES_INSTANCE_UID, VR::UI, series_uid.as_str());
        put_int(&mut obj, tags::SERIES_NUMBER, None);
        put_str(&mut obj, tags::MANUFACTURER, VR::LO, "");

        // Spatial Fiducials
        let now = Local::now().naive_local();
        put_int(&mut obj, tags::INSTANCE_NUMBER, self.number);
        put_date(&mut obj, tags::CONTENT_DATE, Some(now.date()));
        put_time(&mut obj, tags::CONTENT_TIME, Some(now.time()));
        put_str(&mut obj, tags::CONTENT_LABEL, VR::CS, content_label(&self.label));
        put_str(&mut obj, tags::CONTENT_DESCRIPTION, VR::LO, self.descriptor.as_str());
        put_empty(&mut obj, tags::CONTENT_CREATOR_NAME, VR::PN);

        let fiducials = self
            .marks()
            .iter()
            .map(|mark| {
                let mut coordinates = InMemDicomObject::new_empty();
                coordinates.put(DataElement::new(
                    tags::GRAPHIC_DATA,
                    VR::FL,
                    PrimitiveValue::F32([mark.point.x() as f32, mark.point.y() as f32].into_iter().collect()),
                ));
                put_seq(&mut coordinates, tags::REFERENCED_IMAGE_SEQUENCE, vec![reference_item(first)]);

                let mut item = InMemDicomObject::new_empty();
                put_str(&mut item, tags::FIDUCIAL_IDENTIFIER, VR::SH, mark.id.code());
                put_seq(&mut item, tags::FIDUCIAL_IDENTIFIER_CODE_SEQUENCE, vec![code_item(&mark.purpose)]);
                put_str(&mut item, tags::FIDUCIAL_DESCRIPTION, VR::ST, mark.id.label());
                put_str(&mut item, tags::SHAPE_TYPE, VR::CS, "POINT");
                put_seq(&mut item, tags::GRAPHIC_COORDINATES_DATA_SEQUENCE, vec![coordinates]);
                item
            })
            .collect();

        let mut set = InMemDicomObject::new_empty();
        put_seq(
            &mut set,
            tags::REFERENCED_IMAGE_SEQUENCE,
            referenced.iter().map(reference_item).collect(),
        );
        put_seq(&mut set, tags::FIDUCIAL_SEQUENCE, fiducials);
        put_seq(&mut obj, tags::FIDUCIAL_SET_SEQUENCE, vec![set]);

        Ok(obj)
    }
}

fn assigned(identity: &Identity) -> Result<(&Uid, &Uid, &Uid)> {
    let study = identity.study.as_ref().ok_or(IdentifierError::Unassigned("Study Instance UID"))?;
    let series = identity.series.as_ref().ok_or(IdentifierError::Unassigned("Series Instance UID"))?;
    let sop = identity.sop.as_ref().ok_or(IdentifierError::Unassigned("SOP Instance UID"))?;
    Ok((study, series, sop))
}

fn put_sop_common(obj: &mut InMemDicomObject, class: &str, instance: &Uid) {
    put_str(obj, tags::SPECIFIC_CHARACTER_SET, VR::CS, CHARACTER_SET);
    put_str(obj, tags::SOP_CLASS_UID, VR::UI, class);
    put_str(obj, tags::SOP_INSTANCE_UID, VR::UI, instance.as_str());
}

fn put_patient(obj: &mut InMemDicomObject, patient: &PatientModule) {
    put_opt(obj, tags::PATIENT_NAME, VR::PN, patient.name.as_deref());
    put_opt(obj, tags::PATIENT_ID, VR::LO, patient.id.as_deref());
    put_date(obj, tags::PATIENT_BIRTH_DATE, patient.birth_date);
    put_opt(obj, tags::PATIENT_SEX, VR::CS, patient.sex.as_deref());
}

fn put_study(obj: &mut InMemDicomObject, study: &StudyModule, uid: &Uid) {
    put_str(obj, tags::STUDY_INSTANCE_UID, VR::UI, uid.as_str());
    put_date(obj, tags::STUDY_DATE, study.date);
    put_time(obj, tags::STUDY_TIME, study.time);
    put_opt(obj, tags::REFERRING_PHYSICIAN_NAME, VR::PN, study.referring_physician.as_deref());
    put_opt(obj, tags::STUDY_ID, VR::SH, study.study_id.as_deref());
    put_opt(obj, tags::ACCESSION_NUMBER, VR::SH, study.accession_number.as_deref());
    if let Some(description) = &study.description {
        put_str(obj, tags::STUDY_DESCRIPTION, VR::LO, description.as_str());
    }
}

fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: impl Into<String>) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value.into())));
}

fn put_strs<'a>(obj: &mut InMemDicomObject, tag: Tag, vr: VR, values: impl IntoIterator<Item = &'a str>) {
    let values = values.into_iter().map(str::to_string).collect();
    obj.put(DataElement::new(tag, vr, PrimitiveValue::Strs(values)));
}

/// Type 2 attribute: present, possibly empty.
fn put_opt(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: Option<&str>) {
    match value {
        Some(value) => put_str(obj, tag, vr, value),
        None => put_empty(obj, tag, vr),
    }
}

fn put_empty(obj: &mut InMemDicomObject, tag: Tag, vr: VR) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::Empty));
}

fn put_u16(obj: &mut InMemDicomObject, tag: Tag, value: u16) {
    obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

fn put_int(obj: &mut InMemDicomObject, tag: Tag, value: Option<i32>) {
    put_opt(obj, tag, VR::IS, value.map(|n| n.to_string()).as_deref());
}

fn put_date(obj: &mut InMemDicomObject, tag: Tag, value: Option<NaiveDate>) {
    put_opt(obj, tag, VR::DA, value.map(|d| d.format("%Y%m%d").to_string()).as_deref());
}

fn put_time(obj: &mut InMemDicomObject, tag: Tag, value: Option<NaiveTime>) {
    put_opt(obj, tag, VR::TM, value.map(|t| t.format("%H%M%S").to_string()).as_deref());
}

fn put_seq(obj: &mut InMemDicomObject, tag: Tag, items: Vec<InMemDicomObject>) {
    obj.put(DataElement::new(
        tag,
        VR::SQ,
        Value::Sequence(DataSetSequence::new(items, Length::UNDEFINED)),
    ));
}

fn code_item(code: &CodeItem) -> InMemDicomObject {
    let mut item = InMemDicomObject::new_empty();
    put_str(&mut item, tags::CODE_VALUE, VR::SH, code.value);
    put_str(&mut item, tags::CODING_SCHEME_DESIGNATOR, VR::SH, code.scheme);
    if let Some(version) = code.scheme_version {
        put_str(&mut item, tags::CODING_SCHEME_VERSION, VR::SH, version);
    }
    put_str(&mut item, tags::CODE_MEANING, VR::LO, code.meaning);
    item
}

fn reference_item(reference: &InstanceReference) -> InMemDicomObject {
    let mut item = InMemDicomObject::new_empty();
    put_str(&mut item, tags::REFERENCED_SOP_CLASS_UID, VR::UI, reference.sop_class_uid);
    put_str(&mut item, tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, reference.sop_instance_uid.as_str());
    if let Some(purpose) = &reference.purpose {
        put_seq(&mut item, tags::PURPOSE_OF_REFERENCE_CODE_SEQUENCE, vec![code_item(purpose)]);
    }
    item
}

/// Decimal String: at most 16 characters, no trailing zeros.
fn ds(value: f64) -> String {
    for precision in (0..=6).rev() {
        let mut text = format!("{:.*}", precision, value);
        if text.contains('.') {
            text = text.trim_end_matches('0').trim_end_matches('.').to_string();
        }
        if text == "-0" {
            text = "0".to_string();
        }
        if text.len() <= 16 {
            return text;
        }
    }
    format!("{:.6e}", value)
}

/// Code String for Content Label: upper case, `[A-Z0-9_ ]`, at most 16 characters.
fn content_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .map(|c| if c.is_ascii_alphanumeric() || c == ' ' { c } else { '_' })
        .take(16)
        .collect()
}
