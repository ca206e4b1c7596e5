//
// fiducial.rs
// Ceph-Tools-rs
//
// The four calibration marks of a cephalostat and the fiducial set that carries them.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::cephalogram::{PatientModule, StudyModule};
use crate::error::GeometryError;
use crate::geometry::{self, Corners, Distances, Point};
use crate::codes::{CodeItem, FIDUCIAL_MARK};
use crate::uid::{Identity, Uid};

pub const DEFAULT_LABEL: &str = "FIDUCIALS";
pub const DEFAULT_DESCRIPTOR: &str = "Cephalostat calibration marks";

/// Position of a mark on the calibration frame, clockwise from the top left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FiducialId {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl FiducialId {
    pub const ALL: [FiducialId; 4] = [
        FiducialId::TopLeft,
        FiducialId::TopRight,
        FiducialId::BottomRight,
        FiducialId::BottomLeft,
    ];

    pub fn code(self) -> &'static str {
        match self {
            FiducialId::TopLeft => "TL",
            FiducialId::TopRight => "TR",
            FiducialId::BottomRight => "BR",
            FiducialId::BottomLeft => "BL",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FiducialId::TopLeft => "Top Left",
            FiducialId::TopRight => "Top Right",
            FiducialId::BottomRight => "Bottom Right",
            FiducialId::BottomLeft => "Bottom Left",
        }
    }
}

impl fmt::Display for FiducialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiducialMark {
    pub id: FiducialId,
    pub point: Point,
    pub purpose: CodeItem,
}

/// How many images a fiducial set declares it calibrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ReferenceCount {
    One,
    #[default]
    Two,
}

impl ReferenceCount {
    pub fn count(self) -> usize {
        match self {
            ReferenceCount::One => 1,
            ReferenceCount::Two => 2,
        }
    }

    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ReferenceCount::One),
            2 => Some(ReferenceCount::Two),
            _ => None,
        }
    }
}

/// Where the mark coordinates came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FiducialSource {
    /// Trilaterated from six measured distances (millimeters).
    Distances(Distances),
    Coordinates,
}

#[derive(Debug, Clone)]
pub struct FiducialSet {
    identity: Identity,
    marks: [FiducialMark; 4],
    dpi: f64,
    pub label: String,
    pub descriptor: String,
    pub number: Option<i32>,
    pub patient: PatientModule,
    pub study: StudyModule,
    source: FiducialSource,
    reference_count: ReferenceCount,
    referenced_images: Vec<Uid>,
}

impl FiducialSet {
    /// Reconstructs the marks from measured distances and checks them against all six.
    pub fn from_distances(
        distances_mm: Distances,
        dpi: f64,
        tolerance_px: f64,
    ) -> Result<Self, GeometryError> {
        let corners = geometry::reconstruct(&distances_mm, dpi)?;
        geometry::check_consistency(&corners, &distances_mm, dpi, tolerance_px)?;
        debug!(
            f1 = %corners.f1, f2 = %corners.f2, f3 = %corners.f3, f4 = %corners.f4,
            "reconstructed fiducial marks"
        );
        Ok(Self::build(corners, dpi, FiducialSource::Distances(distances_mm)))
    }

    /// Takes literal pixel coordinates as given.
    pub fn from_coordinates(corners: Corners, dpi: f64) -> Result<Self, GeometryError> {
        if !dpi.is_finite() || dpi <= 0.0 {
            return Err(GeometryError::InvalidResolution(dpi));
        }
        Ok(Self::build(corners, dpi, FiducialSource::Coordinates))
    }

    fn build(corners: Corners, dpi: f64, source: FiducialSource) -> Self {
        let points = corners.as_array();
        let marks = FiducialId::ALL.map(|id| FiducialMark {
            id,
            point: points[id as usize],
            purpose: FIDUCIAL_MARK,
        });
        Self {
            identity: Identity::default(),
            marks,
            dpi,
            label: DEFAULT_LABEL.to_string(),
            descriptor: DEFAULT_DESCRIPTOR.to_string(),
            number: None,
            patient: PatientModule::default(),
            study: StudyModule::default(),
            source,
            reference_count: ReferenceCount::default(),
            referenced_images: Vec::new(),
        }
    }

    pub fn with_reference_count(mut self, count: ReferenceCount) -> Self {
        self.reference_count = count;
        self
    }

    pub fn marks(&self) -> &[FiducialMark; 4] {
        &self.marks
    }

    pub fn dpi(&self) -> f64 {
        self.dpi
    }

    pub fn source(&self) -> &FiducialSource {
        &self.source
    }

    pub fn reference_count(&self) -> ReferenceCount {
        self.reference_count
    }

    pub fn referenced_images(&self) -> &[Uid] {
        &self.referenced_images
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub(crate) fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }

    pub(crate) fn set_referenced_images(&mut self, images: Vec<Uid>) {
        self.referenced_images = images;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::MM_PER_INCH;

    pub(crate) fn sample_fiducials() -> FiducialSet {
        let distances = Distances {
            d12: 100.0,
            d13: 128.06,
            d14: 80.0,
            d23: 80.0,
            d24: 128.06,
            d34: 100.0,
        };
        FiducialSet::from_distances(distances, MM_PER_INCH, 2.0).expect("fiducials")
    }

    #[test]
    fn marks_are_clockwise_from_top_left() {
        let set = sample_fiducials();
        let ids: Vec<&str> = set.marks().iter().map(|m| m.id.code()).collect();
        assert_eq!(ids, ["TL", "TR", "BR", "BL"]);
        assert_eq!(set.marks()[0].point, Point::new(0.0, 80.0));
        assert_eq!(set.marks()[1].point, Point::new(100.0, 80.0));
        assert_eq!(set.marks()[2].point, Point::new(100.0, 0.0));
        assert_eq!(set.marks()[3].point, Point::new(0.0, 0.0));
        assert!(set.marks().iter().all(|m| m.purpose == FIDUCIAL_MARK));
        assert_eq!(set.marks()[2].id.label(), "Bottom Right");
    }

    #[test]
    fn inconsistent_distances_are_rejected() {
        let distances = Distances {
            d12: 10.0,
            d13: 128.06,
            d14: 80.0,
            d23: 80.0,
            d24: 128.06,
            d34: 100.0,
        };
        assert!(matches!(
            FiducialSet::from_distances(distances, MM_PER_INCH, 2.0),
            Err(GeometryError::Inconsistent { pair: "d12", .. })
        ));
    }

    #[test]
    fn literal_coordinates_are_kept() {
        let corners = Corners {
            f1: Point::new(12.0, 900.0),
            f2: Point::new(1100.0, 910.0),
            f3: Point::new(1105.0, 15.0),
            f4: Point::new(10.0, 10.0),
        };
        let set = FiducialSet::from_coordinates(corners, 300.0).unwrap();
        assert_eq!(set.marks()[1].point, Point::new(1100.0, 910.0));
        assert_eq!(set.source(), &FiducialSource::Coordinates);
        assert_eq!(set.reference_count(), ReferenceCount::Two);
        assert!(FiducialSet::from_coordinates(corners, 0.0).is_err());
    }

    #[test]
    fn reference_count_conversions() {
        assert_eq!(ReferenceCount::from_count(1), Some(ReferenceCount::One));
        assert_eq!(ReferenceCount::from_count(2), Some(ReferenceCount::Two));
        assert_eq!(ReferenceCount::from_count(3), None);
        assert_eq!(ReferenceCount::One.count(), 1);
    }
}
