//
// config.rs
// Ceph-Tools-rs
//
// Loads `.properties` key/value files over explicit defaults and validates them into typed records.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ::config::{Config, File, FileFormat};
use chrono::{NaiveDate, NaiveTime};
use dicom::dictionary_std::uids;
use tracing::{debug, warn};

use crate::cephalogram::{
    CephalogramImage, PatientModule, PixelModule, PositioningModule, SeriesModule, StudyModule,
    ViewPosition, MIN_DPI,
};
use crate::error::{ConfigError, ConfigIssue, GeometryError};
use crate::fiducial::{FiducialSet, ReferenceCount, DEFAULT_DESCRIPTOR, DEFAULT_LABEL};
use crate::geometry::{Corners, Distances, Point, DEFAULT_TOLERANCE_PX};
use crate::uid::Uid;

const DATE_FORMATS: &[&str] = &["%Y%m%d", "%Y-%m-%d", "%Y.%m.%d", "%m/%d/%Y", "%b %d, %Y", "%d %b %Y"];
const TIME_FORMATS: &[&str] = &["%H%M%S", "%H:%M:%S", "%H:%M:%S%.f", "%H:%M", "%H%M", "%I:%M %p", "%I:%M:%S %p"];

/// Largest disagreement, in percentage points, between a configured `mag` and SID/SOD.
const MAGNIFICATION_TOLERANCE_PCT: f64 = 0.5;

const DISTANCE_KEYS: [&str; 6] = ["d12", "d13", "d14", "d23", "d24", "d34"];
const COORDINATE_KEYS: [&str; 4] = ["F1", "F2", "F3", "F4"];

/// Default values applied under every loaded file. Keys are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    entries: Vec<(String, String)>,
}

impl Defaults {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn cephalogram() -> Self {
        Self::none()
            .with("seriesNumber", "1")
            .with("instanceNumber", "1")
            .with("transferSyntax", uids::JPEG_BASELINE8_BIT)
    }

    pub fn fiducials() -> Self {
        Self::none()
            .with("label", DEFAULT_LABEL)
            .with("descriptor", DEFAULT_DESCRIPTOR)
            .with("tolerance", DEFAULT_TOLERANCE_PX.to_string())
            .with("fiducialReferenceCount", "2")
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.push((key.to_ascii_lowercase(), value.into()));
        self
    }
}

/// A flat, case-insensitive key/value view of one configuration file.
#[derive(Debug, Clone)]
pub struct Properties {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl Properties {
    pub fn from_pairs<K, V>(path: impl Into<PathBuf>, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| {
                let value = v.as_ref().trim().trim_matches('"').trim().to_string();
                (k.as_ref().trim().to_ascii_lowercase(), value)
            })
            .collect();
        Self {
            path: path.into(),
            values,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-empty value for `key`, regardless of case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn apply(&mut self, defaults: &Defaults) {
        for (key, value) in &defaults.entries {
            let slot = self.values.entry(key.clone()).or_default();
            if slot.is_empty() {
                *slot = value.clone();
            }
        }
    }
}

/// Reads `.properties` files through the `config` crate and merges the defaults once.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    defaults: Defaults,
}

impl ConfigLoader {
    pub fn new(defaults: Defaults) -> Self {
        Self { defaults }
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Properties, ConfigError> {
        let path = path.as_ref();
        let source_error = |message: String| ConfigError::Source {
            path: path.to_path_buf(),
            message,
        };

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini))
            .build()
            .map_err(|e| source_error(e.to_string()))?;
        let raw: HashMap<String, String> = settings
            .try_deserialize()
            .map_err(|e| source_error(e.to_string()))?;

        let mut properties = Properties::from_pairs(path, raw);
        properties.apply(&self.defaults);
        debug!(path = %path.display(), keys = properties.values.len(), "loaded properties");
        Ok(properties)
    }
}

/// `<image stem>.properties` next to the image.
pub fn sidecar_path(image: &Path) -> PathBuf {
    image.with_extension("properties")
}

/// Collects every problem in one pass instead of stopping at the first.
struct Checker<'a> {
    props: &'a Properties,
    issues: Vec<ConfigIssue>,
}

impl<'a> Checker<'a> {
    fn new(props: &'a Properties) -> Self {
        Self {
            props,
            issues: Vec::new(),
        }
    }

    fn issue(&mut self, key: &str, message: impl Into<String>) {
        self.issues.push(ConfigIssue {
            key: key.to_string(),
            message: message.into(),
        });
    }

    fn text(&self, key: &str) -> Option<String> {
        self.props.get(key).map(str::to_string)
    }

    fn has(&self, key: &str) -> bool {
        self.props.get(key).is_some()
    }

    fn optional<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.props.get(key)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                self.issue(key, format!("invalid value {:?}: {}", raw, e));
                None
            }
        }
    }

    fn required<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        if !self.has(key) {
            self.issue(key, "missing");
            return None;
        }
        self.optional(key)
    }

    fn with_formats<T>(
        &mut self,
        key: &str,
        formats: &[&str],
        parse: impl Fn(&str, &str) -> Option<T>,
    ) -> Option<T> {
        let raw = self.props.get(key)?;
        let parsed = formats.iter().find_map(|f| parse(raw, f));
        if parsed.is_none() {
            self.issue(key, format!("unrecognised value {:?}", raw));
        }
        parsed
    }

    fn date(&mut self, key: &str) -> Option<NaiveDate> {
        self.with_formats(key, DATE_FORMATS, |raw, f| NaiveDate::parse_from_str(raw, f).ok())
    }

    fn time(&mut self, key: &str) -> Option<NaiveTime> {
        self.with_formats(key, TIME_FORMATS, |raw, f| NaiveTime::parse_from_str(raw, f).ok())
    }

    fn dpi(&mut self, key: &str, required: bool) -> Option<f64> {
        let dpi: f64 = if required {
            self.required(key)?
        } else {
            self.optional(key)?
        };
        if !dpi.is_finite() || dpi < MIN_DPI {
            self.issue(key, format!("{} dpi is below the minimum of {} dpi", dpi, MIN_DPI));
            return None;
        }
        Some(dpi)
    }

    /// Fails with every recorded issue, or yields the assembled value.
    fn finish<T>(mut self, value: Option<T>) -> Result<T, ConfigError> {
        match value {
            Some(value) if self.issues.is_empty() => Ok(value),
            value => {
                if value.is_none() && self.issues.is_empty() {
                    self.issue("*", "incomplete configuration");
                }
                Err(ConfigError::Invalid {
                    path: self.props.path().to_path_buf(),
                    issues: self.issues,
                })
            }
        }
    }
}

/// Validated settings for one cephalogram.
#[derive(Debug, Clone)]
pub struct CephalogramConfig {
    pub patient: PatientModule,
    pub study: StudyModule,
    pub series: SeriesModule,
    pub study_uid: Option<Uid>,
    pub patient_orientation: Option<(String, String)>,
    pub positioning: PositioningModule,
    pub dpi: Option<f64>,
    pub transfer_syntax: String,
}

impl CephalogramConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let props = ConfigLoader::new(Defaults::cephalogram()).load(path)?;
        Self::from_properties(&props)
    }

    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let mut c = Checker::new(props);

        let patient = PatientModule {
            name: c.text("patientName"),
            id: c.text("patientID"),
            birth_date: c.date("patientDOB"),
            sex: patient_sex(&mut c),
        };
        let study = StudyModule {
            date: c.date("studyDate"),
            time: c.time("studyTime"),
            referring_physician: c.text("referringPhysician"),
            study_id: c.text("studyID"),
            accession_number: c.text("accessionNumber"),
            description: c.text("studyDescription"),
        };
        let series = SeriesModule {
            series_number: c.optional("seriesNumber"),
            instance_number: c.optional("instanceNumber"),
        };
        let study_uid = c.optional::<Uid>("studyInstanceUID");
        let patient_orientation = patient_orientation(&mut c);

        let view: Option<ViewPosition> = c.required("cephalogramType");
        let sid: Option<f64> = c.required("sid");
        let sod: Option<f64> = c.required("sod");
        let positioning = match (view, sid, sod) {
            (Some(view), Some(sid), Some(sod)) => match PositioningModule::new(view, sid, sod) {
                Ok(positioning) => Some(positioning),
                Err(message) => {
                    c.issue("sod", message);
                    None
                }
            },
            _ => None,
        };
        if let (Some(positioning), Some(mag)) = (positioning, c.optional::<f64>("mag")) {
            let derived = positioning.magnification() * 100.0;
            if (mag - derived).abs() > MAGNIFICATION_TOLERANCE_PCT {
                c.issue(
                    "mag",
                    format!("{}% disagrees with SID/SOD magnification of {:.2}%", mag, derived),
                );
            }
        }

        let dpi = c.dpi("dpi", false);
        let transfer_syntax = c
            .optional::<Uid>("transferSyntax")
            .map(|uid| uid.to_string())
            .unwrap_or_else(|| uids::JPEG_BASELINE8_BIT.to_string());

        let positioning = c.finish(positioning)?;
        Ok(Self {
            patient,
            study,
            series,
            study_uid,
            patient_orientation,
            positioning,
            dpi,
            transfer_syntax,
        })
    }

    /// Binds the settings to a payload, reading its dimensions.
    pub fn into_image(self, payload: &Path) -> crate::error::Result<CephalogramImage> {
        let pixel = PixelModule::from_payload(payload, self.dpi, &self.transfer_syntax)?;
        let mut image = CephalogramImage::new(self.positioning, pixel, payload)
            .with_patient(self.patient)
            .with_study(self.study);
        image.series = self.series;
        image.patient_orientation = self.patient_orientation;
        if let Some(uid) = self.study_uid {
            image = image.with_study_uid(uid);
        }
        Ok(image)
    }
}

fn patient_sex(c: &mut Checker<'_>) -> Option<String> {
    let sex = c.text("patientSex")?.to_ascii_uppercase();
    match sex.as_str() {
        "M" | "F" | "O" => Some(sex),
        _ => {
            c.issue("patientSex", format!("expected M, F or O but got {:?}", sex));
            None
        }
    }
}

fn patient_orientation(c: &mut Checker<'_>) -> Option<(String, String)> {
    const ROW: &str = "patientOrientationRow";
    const COLUMN: &str = "patientOrientationColumn";
    let valid = |s: &str| s.chars().all(|ch| "APLRHF".contains(ch));

    match (c.text(ROW), c.text(COLUMN)) {
        (None, None) => None,
        (Some(row), Some(column)) => {
            let (row, column) = (row.to_ascii_uppercase(), column.to_ascii_uppercase());
            let mut ok = true;
            for (key, value) in [(ROW, &row), (COLUMN, &column)] {
                if !valid(value) {
                    c.issue(key, format!("{:?} is not built from A, P, L, R, H, F", value));
                    ok = false;
                }
            }
            ok.then_some((row, column))
        }
        (Some(_), None) => {
            c.issue(COLUMN, "missing (row orientation is set)");
            None
        }
        (None, Some(_)) => {
            c.issue(ROW, "missing (column orientation is set)");
            None
        }
    }
}

/// How the four marks are specified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FiducialInput {
    Distances(Distances),
    Coordinates(Corners),
}

/// Validated settings for one fiducial set.
#[derive(Debug, Clone)]
pub struct FiducialConfig {
    pub input: FiducialInput,
    pub dpi: f64,
    pub label: String,
    pub descriptor: String,
    pub number: Option<i32>,
    pub tolerance_px: f64,
    pub reference_count: ReferenceCount,
}

impl FiducialConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let props = ConfigLoader::new(Defaults::fiducials()).load(path)?;
        Self::from_properties(&props)
    }

    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let mut c = Checker::new(props);

        let input = fiducial_input(&mut c);
        let dpi = c.dpi("dpi", true);
        let label = c.text("label").unwrap_or_else(|| DEFAULT_LABEL.to_string());
        let descriptor = c.text("descriptor").unwrap_or_else(|| DEFAULT_DESCRIPTOR.to_string());
        let number = c.optional("number");

        let tolerance_px = match c.optional::<f64>("tolerance") {
            Some(t) if t.is_finite() && t >= 0.0 => t,
            Some(t) => {
                c.issue("tolerance", format!("must be a non-negative number of pixels (got {})", t));
                DEFAULT_TOLERANCE_PX
            }
            None => DEFAULT_TOLERANCE_PX,
        };

        let reference_count = match c.optional::<usize>("fiducialReferenceCount") {
            Some(n) => ReferenceCount::from_count(n).unwrap_or_else(|| {
                c.issue("fiducialReferenceCount", format!("must be 1 or 2 (got {})", n));
                ReferenceCount::default()
            }),
            None => ReferenceCount::default(),
        };

        let (input, dpi) = c.finish(input.zip(dpi))?;
        Ok(Self {
            input,
            dpi,
            label,
            descriptor,
            number,
            tolerance_px,
            reference_count,
        })
    }

    /// Builds the fiducial set, reconstructing marks from distances when needed.
    pub fn into_fiducial_set(self) -> Result<FiducialSet, GeometryError> {
        let mut set = match self.input {
            FiducialInput::Distances(distances) => {
                FiducialSet::from_distances(distances, self.dpi, self.tolerance_px)?
            }
            FiducialInput::Coordinates(corners) => FiducialSet::from_coordinates(corners, self.dpi)?,
        }
        .with_reference_count(self.reference_count);
        set.label = self.label;
        set.descriptor = self.descriptor;
        set.number = self.number;
        Ok(set)
    }
}

/// Literal F1..F4 coordinates win over distances when both are complete.
fn fiducial_input(c: &mut Checker<'_>) -> Option<FiducialInput> {
    let coordinates_given = COORDINATE_KEYS.iter().filter(|k| c.has(k)).count();
    let distances_given = DISTANCE_KEYS.iter().filter(|k| c.has(k)).count();

    if coordinates_given == COORDINATE_KEYS.len() {
        if distances_given == DISTANCE_KEYS.len() {
            warn!(
                path = %c.props.path().display(),
                "both F1..F4 and d12..d34 are set; using the literal coordinates"
            );
        }
        let [f1, f2, f3, f4] = COORDINATE_KEYS.map(|key| c.required::<PointValue>(key).map(|p| p.0));
        return Some(FiducialInput::Coordinates(Corners {
            f1: f1?,
            f2: f2?,
            f3: f3?,
            f4: f4?,
        }));
    }

    if coordinates_given > 0 && distances_given < DISTANCE_KEYS.len() {
        let missing: Vec<&str> = COORDINATE_KEYS.into_iter().filter(|k| !c.has(k)).collect();
        for key in missing {
            c.issue(key, "missing (other coordinates are set)");
        }
    }
    let [d12, d13, d14, d23, d24, d34] = DISTANCE_KEYS.map(|key| c.required::<f64>(key));
    Some(FiducialInput::Distances(Distances {
        d12: d12?,
        d13: d13?,
        d14: d14?,
        d23: d23?,
        d24: d24?,
        d34: d34?,
    }))
}

/// `"x,y"` adapter so points go through the same parse path as other values.
struct PointValue(Point);

impl FromStr for PointValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Point::parse(s).map(PointValue)
    }
}
