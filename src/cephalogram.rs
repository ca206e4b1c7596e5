//
// cephalogram.rs
// Ceph-Tools-rs
//
// Cephalogram image model: view classification plus patient, study, positioning and pixel attribute groups.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use dicom::dictionary_std::uids;
use image::{ColorType, ImageDecoder, ImageError, ImageReader};
use serde::Serialize;

use crate::codes::CodeItem;
use crate::error::{CephError, Result};
use crate::geometry::MM_PER_INCH;
use crate::uid::{Identity, InstanceReference, Uid};

/// Lowest accepted scan resolution.
pub const MIN_DPI: f64 = 128.0;

/// Radiographic projection of a cephalogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViewPosition {
    PosteroAnterior,
    AnteroPosterior,
    LeftLateral,
    RightLateral,
}

impl ViewPosition {
    pub fn is_lateral(self) -> bool {
        matches!(self, ViewPosition::LeftLateral | ViewPosition::RightLateral)
    }

    /// Defined term for View Position (0018,5101).
    pub fn code_string(self) -> &'static str {
        match self {
            ViewPosition::PosteroAnterior => "PA",
            ViewPosition::AnteroPosterior => "AP",
            ViewPosition::LeftLateral => "LL",
            ViewPosition::RightLateral => "RL",
        }
    }

    /// Positioner primary angle in degrees.
    pub fn primary_angle(self) -> f64 {
        match self {
            ViewPosition::PosteroAnterior => 180.0,
            ViewPosition::AnteroPosterior => 0.0,
            ViewPosition::LeftLateral => 90.0,
            ViewPosition::RightLateral => -90.0,
        }
    }

    pub fn secondary_angle(self) -> f64 {
        0.0
    }

    pub fn view_code(self) -> CodeItem {
        match self {
            ViewPosition::PosteroAnterior => CodeItem::new("R-10214", "SNM3", "postero-anterior"),
            ViewPosition::AnteroPosterior => CodeItem::new("R-10206", "SNM3", "antero-posterior"),
            ViewPosition::LeftLateral => CodeItem::new("R-10236", "SNM3", "left lateral"),
            ViewPosition::RightLateral => CodeItem::new("R-10232", "SNM3", "right lateral"),
        }
    }
}

impl fmt::Display for ViewPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewPosition::PosteroAnterior => "postero-anterior",
            ViewPosition::AnteroPosterior => "antero-posterior",
            ViewPosition::LeftLateral => "left lateral",
            ViewPosition::RightLateral => "right lateral",
        };
        f.write_str(name)
    }
}

impl FromStr for ViewPosition {
    type Err = String;

    /// Accepts `PA`, `AP`, `L`/`LL` (left lateral) and `RL`, case-insensitively.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PA" => Ok(ViewPosition::PosteroAnterior),
            "AP" => Ok(ViewPosition::AnteroPosterior),
            "L" | "LL" | "LAT" => Ok(ViewPosition::LeftLateral),
            "RL" => Ok(ViewPosition::RightLateral),
            other => Err(format!("unknown cephalogram type {:?} (expected PA, AP, L, LL or RL)", other)),
        }
    }
}

/// Patient module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatientModule {
    pub name: Option<String>,
    pub id: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<String>,
}

/// General study module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudyModule {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub referring_physician: Option<String>,
    pub study_id: Option<String>,
    pub accession_number: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeriesModule {
    pub series_number: Option<i32>,
    pub instance_number: Option<i32>,
}

/// Cephalostat geometry. Magnification is derived from the two distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositioningModule {
    view: ViewPosition,
    source_to_detector_mm: f64,
    source_to_patient_mm: f64,
}

impl PositioningModule {
    /// Requires `0 < sod <= sid`, both finite.
    pub fn new(view: ViewPosition, sid_mm: f64, sod_mm: f64) -> std::result::Result<Self, String> {
        if !sid_mm.is_finite() || sid_mm <= 0.0 {
            return Err(format!("source-to-detector distance must be positive (got {})", sid_mm));
        }
        if !sod_mm.is_finite() || sod_mm <= 0.0 {
            return Err(format!("source-to-patient distance must be positive (got {})", sod_mm));
        }
        if sod_mm > sid_mm {
            return Err(format!(
                "source-to-patient distance {} exceeds source-to-detector distance {}",
                sod_mm, sid_mm
            ));
        }
        Ok(Self {
            view,
            source_to_detector_mm: sid_mm,
            source_to_patient_mm: sod_mm,
        })
    }

    pub fn view(&self) -> ViewPosition {
        self.view
    }

    pub fn source_to_detector_mm(&self) -> f64 {
        self.source_to_detector_mm
    }

    pub fn source_to_patient_mm(&self) -> f64 {
        self.source_to_patient_mm
    }

    pub fn magnification(&self) -> f64 {
        self.source_to_detector_mm / self.source_to_patient_mm
    }
}

/// Image pixel module for an 8-bit monochrome payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelModule {
    pub rows: u16,
    pub columns: u16,
    /// Square pixel spacing in millimeters, when the scan resolution is known.
    pub pixel_spacing_mm: Option<f64>,
    pub transfer_syntax: String,
}

impl PixelModule {
    /// Reads the payload dimensions and color type from the image header.
    ///
    /// Only 8-bit greyscale payloads are accepted, matching the MONOCHROME2 attributes written for them.
    pub fn from_payload(path: &Path, dpi: Option<f64>, transfer_syntax: &str) -> Result<Self> {
        let unreadable = |e: ImageError| CephError::Image(format!("{}: {}", path.display(), e));
        let decoder = ImageReader::open(path)
            .map_err(|e| CephError::io(path, e))?
            .with_guessed_format()
            .map_err(|e| CephError::io(path, e))?
            .into_decoder()
            .map_err(unreadable)?;
        let color = decoder.color_type();
        if color != ColorType::L8 {
            return Err(CephError::Image(format!(
                "{}: expected 8-bit greyscale, found {:?}",
                path.display(),
                color
            )));
        }
        let (width, height) = decoder.dimensions();
        let rows = u16::try_from(height)
            .map_err(|_| CephError::Image(format!("{}: {} rows exceed 65535", path.display(), height)))?;
        let columns = u16::try_from(width)
            .map_err(|_| CephError::Image(format!("{}: {} columns exceed 65535", path.display(), width)))?;
        Ok(Self {
            rows,
            columns,
            pixel_spacing_mm: dpi.map(|dpi| MM_PER_INCH / dpi),
            transfer_syntax: transfer_syntax.to_string(),
        })
    }

    pub fn is_lossy(&self) -> bool {
        self.transfer_syntax == uids::JPEG_BASELINE8_BIT
    }
}

/// One DX cephalogram and the references it carries once placed in a set.
#[derive(Debug, Clone)]
pub struct CephalogramImage {
    identity: Identity,
    pub patient: PatientModule,
    pub study: StudyModule,
    pub series: SeriesModule,
    /// Patient orientation (row, column) direction codes.
    pub patient_orientation: Option<(String, String)>,
    pub positioning: PositioningModule,
    pub pixel: PixelModule,
    payload: PathBuf,
    other_image: Option<InstanceReference>,
    fiducial_set: Option<InstanceReference>,
}

impl CephalogramImage {
    pub fn new(
        positioning: PositioningModule,
        pixel: PixelModule,
        payload: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identity: Identity::default(),
            patient: PatientModule::default(),
            study: StudyModule::default(),
            series: SeriesModule::default(),
            patient_orientation: None,
            positioning,
            pixel,
            payload: payload.into(),
            other_image: None,
            fiducial_set: None,
        }
    }

    pub fn with_patient(mut self, patient: PatientModule) -> Self {
        self.patient = patient;
        self
    }

    pub fn with_study(mut self, study: StudyModule) -> Self {
        self.study = study;
        self
    }

    pub fn with_study_uid(mut self, uid: Uid) -> Self {
        self.identity.study = Some(uid);
        self
    }

    pub fn with_sop_uid(mut self, uid: Uid) -> Self {
        self.identity.sop = Some(uid);
        self
    }

    pub fn view(&self) -> ViewPosition {
        self.positioning.view()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub(crate) fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }

    pub fn payload(&self) -> &Path {
        &self.payload
    }

    pub fn other_image(&self) -> Option<&InstanceReference> {
        self.other_image.as_ref()
    }

    pub fn fiducial_reference(&self) -> Option<&InstanceReference> {
        self.fiducial_set.as_ref()
    }

    pub(crate) fn set_other_image(&mut self, reference: InstanceReference) {
        self.other_image = Some(reference);
    }

    pub(crate) fn set_fiducial_reference(&mut self, reference: InstanceReference) {
        self.fiducial_set = Some(reference);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_image(view: ViewPosition) -> CephalogramImage {
        let positioning = PositioningModule::new(view, 1651.0, 1524.0).expect("positioning");
        let pixel = PixelModule {
            rows: 2000,
            columns: 2400,
            pixel_spacing_mm: Some(MM_PER_INCH / 300.0),
            transfer_syntax: uids::JPEG_BASELINE8_BIT.to_string(),
        };
        CephalogramImage::new(positioning, pixel, format!("{}.jpg", view.code_string())).with_patient(
            PatientModule {
                name: Some("DOE^JANE".into()),
                id: Some("B1893".into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn parses_view_keywords() {
        assert_eq!("pa".parse::<ViewPosition>(), Ok(ViewPosition::PosteroAnterior));
        assert_eq!("AP".parse::<ViewPosition>(), Ok(ViewPosition::AnteroPosterior));
        assert_eq!("L".parse::<ViewPosition>(), Ok(ViewPosition::LeftLateral));
        assert_eq!("LL".parse::<ViewPosition>(), Ok(ViewPosition::LeftLateral));
        assert_eq!(" rl ".parse::<ViewPosition>(), Ok(ViewPosition::RightLateral));
        assert!("oblique".parse::<ViewPosition>().is_err());
    }

    #[test]
    fn lateral_views_are_classified() {
        assert!(ViewPosition::LeftLateral.is_lateral());
        assert!(ViewPosition::RightLateral.is_lateral());
        assert!(!ViewPosition::PosteroAnterior.is_lateral());
        assert!(!ViewPosition::AnteroPosterior.is_lateral());
    }

    #[test]
    fn view_specific_positioning() {
        assert_eq!(ViewPosition::PosteroAnterior.primary_angle(), 180.0);
        assert_eq!(ViewPosition::AnteroPosterior.primary_angle(), 0.0);
        assert_eq!(ViewPosition::RightLateral.primary_angle(), -90.0);
        assert_eq!(ViewPosition::LeftLateral.primary_angle(), 90.0);
        assert_eq!(ViewPosition::PosteroAnterior.view_code().value, "R-10214");
        assert_eq!(ViewPosition::RightLateral.view_code().meaning, "right lateral");
    }

    #[test]
    fn magnification_is_derived() {
        let positioning = PositioningModule::new(ViewPosition::LeftLateral, 1650.0, 1500.0).unwrap();
        assert!((positioning.magnification() - 1.1).abs() < 1e-12);

        assert!(PositioningModule::new(ViewPosition::LeftLateral, 1500.0, 1650.0).is_err());
        assert!(PositioningModule::new(ViewPosition::LeftLateral, 0.0, 0.0).is_err());
        assert!(PositioningModule::new(ViewPosition::LeftLateral, f64::NAN, 10.0).is_err());
    }

    #[test]
    fn colour_payloads_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let grey = dir.path().join("grey.jpg");
        let colour = dir.path().join("colour.jpg");
        image::GrayImage::from_pixel(32, 24, image::Luma([90])).save(&grey).unwrap();
        image::RgbImage::from_pixel(32, 24, image::Rgb([200, 40, 40])).save(&colour).unwrap();

        let pixel = PixelModule::from_payload(&grey, Some(300.0), uids::JPEG_BASELINE8_BIT).unwrap();
        assert_eq!((pixel.rows, pixel.columns), (24, 32));

        let err = PixelModule::from_payload(&colour, Some(300.0), uids::JPEG_BASELINE8_BIT).unwrap_err();
        assert!(matches!(err, CephError::Image(ref msg) if msg.contains("greyscale")));
    }

    #[test]
    fn jpeg_payloads_are_lossy() {
        let image = sample_image(ViewPosition::PosteroAnterior);
        assert!(image.pixel.is_lossy());
        assert_eq!(image.view(), ViewPosition::PosteroAnterior);
        assert!(image.identity().sop.is_none());
    }
}
