//
// geometry.rs
// Ceph-Tools-rs
//
// Reconstructs the four corner fiducials of a cephalogram from their six pairwise distances.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GeometryError;

pub const MM_PER_INCH: f64 = 25.4;

/// Absolute slack, in pixels, allowed between a measured and a reconstructed distance.
pub const DEFAULT_TOLERANCE_PX: f64 = 2.0;

/// Relative slack; dominates the absolute one for long distances.
const RELATIVE_TOLERANCE: f64 = 0.02;

/// Radicands within this fraction of the squared side are float noise on a flat triangle.
const RADICAND_EPSILON: f64 = 1e-9;

/// A point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    x: f64,
    y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn rounded(x: f64, y: f64) -> Self {
        Self::new(x.round(), y.round())
    }

    /// Parses a literal `"x,y"` coordinate pair.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut parts = s.split(',').map(str::trim);
        let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected \"x,y\" but got {:?}", s));
        };
        let x: f64 = x
            .parse()
            .map_err(|e| format!("invalid x coordinate {:?}: {}", x, e))?;
        let y: f64 = y
            .parse()
            .map_err(|e| format!("invalid y coordinate {:?}: {}", y, e))?;
        if !x.is_finite() || !y.is_finite() {
            return Err(format!("coordinates must be finite: {:?}", s));
        }
        Ok(Self::new(x, y))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The six pairwise distances between fiducials F1 (top left), F2 (top right),
/// F3 (bottom right) and F4 (bottom left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distances {
    pub d12: f64,
    pub d13: f64,
    pub d14: f64,
    pub d23: f64,
    pub d24: f64,
    pub d34: f64,
}

impl Distances {
    /// Pairwise distances of four points, in whatever unit the points use.
    pub fn between(f1: &Point, f2: &Point, f3: &Point, f4: &Point) -> Self {
        Self {
            d12: f1.distance(f2),
            d13: f1.distance(f3),
            d14: f1.distance(f4),
            d23: f2.distance(f3),
            d24: f2.distance(f4),
            d34: f3.distance(f4),
        }
    }

    pub fn named(&self) -> [(&'static str, f64); 6] {
        [
            ("d12", self.d12),
            ("d13", self.d13),
            ("d14", self.d14),
            ("d23", self.d23),
            ("d24", self.d24),
            ("d34", self.d34),
        ]
    }

    fn validate(&self) -> Result<(), GeometryError> {
        for (name, value) in self.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(GeometryError::InvalidDistance { name, value });
            }
        }
        Ok(())
    }

    fn scaled(&self, factor: f64) -> Self {
        Self {
            d12: self.d12 * factor,
            d13: self.d13 * factor,
            d14: self.d14 * factor,
            d23: self.d23 * factor,
            d24: self.d24 * factor,
            d34: self.d34 * factor,
        }
    }

    /// Millimeters to pixels at the given resolution.
    pub fn to_pixels(&self, dpi: f64) -> Self {
        self.scaled(dpi / MM_PER_INCH)
    }
}

/// Four fiducial points, clockwise from the top left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corners {
    pub f1: Point,
    pub f2: Point,
    pub f3: Point,
    pub f4: Point,
}

impl Corners {
    pub fn distances(&self) -> Distances {
        Distances::between(&self.f1, &self.f2, &self.f3, &self.f4)
    }

    pub fn as_array(&self) -> [Point; 4] {
        [self.f1, self.f2, self.f3, self.f4]
    }
}

/// Places F4 at the origin and F3 on the positive x axis, then trilaterates F2 and F1.
///
/// F2 is taken above the F3–F4 axis. F1's reflection is ambiguous, so all four sign
/// combinations are tried and the one whose distance to F2 best matches `d12` wins.
/// Coordinates are rounded to whole pixels.
///
/// # Errors
///
/// Returns a [`GeometryError`] for negative or non-finite input, a zero baseline,
/// or a construction triangle that violates the triangle inequality.
pub fn reconstruct(distances_mm: &Distances, dpi: f64) -> Result<Corners, GeometryError> {
    if !dpi.is_finite() || dpi <= 0.0 {
        return Err(GeometryError::InvalidResolution(dpi));
    }
    distances_mm.validate()?;

    let d = distances_mm.to_pixels(dpi);
    if d.d34 == 0.0 {
        return Err(GeometryError::DegenerateBaseline);
    }

    let f4 = Point::new(0.0, 0.0);
    let f3 = Point::rounded(d.d34, 0.0);

    let (x2, y2) = trilaterate(d.d34, d.d24, d.d23, "F2-F3-F4")?;
    let (x1, y1) = trilaterate(d.d34, d.d14, d.d13, "F1-F3-F4")?;

    let f2_exact = Point::new(x2, y2);
    let candidates = [(x1, y1), (-x1, y1), (x1, -y1), (-x1, -y1)];
    let mut best = candidates[0];
    let mut best_error = f64::INFINITY;
    for (x, y) in candidates {
        let error = (Point::new(x, y).distance(&f2_exact) - d.d12).abs();
        if error < best_error {
            best = (x, y);
            best_error = error;
        }
    }

    Ok(Corners {
        f1: Point::rounded(best.0, best.1),
        f2: Point::rounded(x2, y2),
        f3,
        f4,
    })
}

/// Circle intersection for a point at distance `to_origin` from F4 and `to_base` from F3.
fn trilaterate(
    base: f64,
    to_origin: f64,
    to_base: f64,
    triangle: &'static str,
) -> Result<(f64, f64), GeometryError> {
    let x = (base.powi(2) + to_origin.powi(2) - to_base.powi(2)) / (2.0 * base);
    let radicand = to_origin.powi(2) - x.powi(2);
    let noise = RADICAND_EPSILON * base.max(to_origin).max(to_base).powi(2);
    if radicand < -noise {
        return Err(GeometryError::TriangleInequality {
            triangle,
            radicand: radicand.abs(),
        });
    }
    if radicand < 0.0 {
        debug!(triangle, radicand, "flat triangle, negative radicand within rounding taken as zero");
        return Ok((x, 0.0));
    }
    Ok((x, radicand.sqrt()))
}

/// Verifies that every pairwise distance of `corners` matches its measured counterpart.
///
/// Each pair may deviate by `max(tolerance_px, 2%)` of the measured pixel distance.
pub fn check_consistency(
    corners: &Corners,
    distances_mm: &Distances,
    dpi: f64,
    tolerance_px: f64,
) -> Result<(), GeometryError> {
    let measured = distances_mm.to_pixels(dpi);
    let reconstructed = corners.distances();

    for ((pair, measured), (_, reconstructed)) in
        measured.named().into_iter().zip(reconstructed.named())
    {
        let tolerance = tolerance_px.max(measured * RELATIVE_TOLERANCE);
        if (measured - reconstructed).abs() > tolerance {
            return Err(GeometryError::Inconsistent {
                pair,
                measured,
                reconstructed,
                tolerance,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_distances() -> Distances {
        Distances {
            d12: 100.0,
            d13: 128.06,
            d14: 80.0,
            d23: 80.0,
            d24: 128.06,
            d34: 100.0,
        }
    }

    #[test]
    fn reconstructs_rectangle_at_one_pixel_per_mm() {
        let corners = reconstruct(&square_distances(), MM_PER_INCH).expect("valid rectangle");
        assert_eq!(corners.f4, Point::new(0.0, 0.0));
        assert_eq!(corners.f3, Point::new(100.0, 0.0));
        assert_eq!(corners.f2, Point::new(100.0, 80.0));
        assert_eq!(corners.f1, Point::new(0.0, 80.0));
    }

    #[test]
    fn selects_negative_branch_when_it_matches_d12() {
        // True F1 = (0, -80), below the F3-F4 axis.
        let f1 = Point::new(0.0, -80.0);
        let f2 = Point::new(100.0, 80.0);
        let f3 = Point::new(100.0, 0.0);
        let f4 = Point::new(0.0, 0.0);
        let distances = Distances::between(&f1, &f2, &f3, &f4);

        let corners = reconstruct(&distances, MM_PER_INCH).expect("valid quadrilateral");
        assert_eq!(corners.f1.x(), 0.0);
        assert_eq!(corners.f1.y(), -80.0);
        assert_eq!(corners.f2, Point::new(100.0, 80.0));
    }

    #[test]
    fn triangle_inequality_violation_is_an_error() {
        let distances = Distances {
            d12: 5.0,
            d13: 8.0,
            d14: 5.0,
            d23: 1000.0,
            d24: 1.0,
            d34: 10.0,
        };
        match reconstruct(&distances, MM_PER_INCH) {
            Err(GeometryError::TriangleInequality { triangle, radicand }) => {
                assert_eq!(triangle, "F2-F3-F4");
                assert!(radicand > 0.0);
                assert!(radicand.is_finite());
            }
            other => panic!("expected triangle inequality error, got {:?}", other),
        }
    }

    #[test]
    fn rounding_noise_on_a_flat_triangle_is_tolerated() {
        // 1 + (2 - 1e-10) is a hair short of 3: the radicand comes out near -1.3e-10
        let (x, y) = trilaterate(3.0, 1.0, 2.0 - 1e-10, "F4-F3-F2").unwrap();
        assert!((x - 1.0).abs() < 1e-9);
        assert_eq!(y, 0.0);

        assert!(matches!(
            trilaterate(3.0, 1.0, 1.9, "F4-F3-F2"),
            Err(GeometryError::TriangleInequality { triangle: "F4-F3-F2", .. })
        ));
    }

    #[test]
    fn f1_triangle_is_checked_too() {
        let mut distances = square_distances();
        distances.d13 = 500.0;
        let err = reconstruct(&distances, MM_PER_INCH).unwrap_err();
        assert!(matches!(
            err,
            GeometryError::TriangleInequality {
                triangle: "F1-F3-F4",
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_inputs() {
        let distances = square_distances();
        assert_eq!(
            reconstruct(&distances, 0.0),
            Err(GeometryError::InvalidResolution(0.0))
        );

        let mut negative = distances;
        negative.d24 = -1.0;
        assert!(matches!(
            reconstruct(&negative, 300.0),
            Err(GeometryError::InvalidDistance { name: "d24", .. })
        ));

        let mut flat = distances;
        flat.d34 = 0.0;
        assert_eq!(
            reconstruct(&flat, 300.0),
            Err(GeometryError::DegenerateBaseline)
        );
    }

    #[test]
    fn round_trip_recovers_quadrilateral_at_300_dpi() {
        let scale = 300.0 / MM_PER_INCH;
        // Corner marks in mm, already in the reconstruction gauge (F4 origin, F3 on +x).
        let mm = [
            Point::new(-5.0, 155.0),
            Point::new(195.0, 150.0),
            Point::new(200.0, 0.0),
            Point::new(0.0, 0.0),
        ];
        let distances = Distances::between(&mm[0], &mm[1], &mm[2], &mm[3]);

        let corners = reconstruct(&distances, 300.0).expect("valid quadrilateral");
        for (got, want) in corners.as_array().iter().zip(mm.iter()) {
            assert!((got.x() - want.x() * scale).abs() <= 1.0, "{} vs {}", got, want);
            assert!((got.y() - want.y() * scale).abs() <= 1.0, "{} vs {}", got, want);
        }
        check_consistency(&corners, &distances, 300.0, DEFAULT_TOLERANCE_PX)
            .expect("consistent reconstruction");
    }

    #[test]
    fn round_trip_is_rigid_invariant() {
        // A rotated and translated quadrilateral: only its shape must survive.
        let points = [
            Point::new(40.0, 310.0),
            Point::new(250.0, 365.0),
            Point::new(300.0, 120.0),
            Point::new(70.0, 80.0),
        ];
        let distances = Distances::between(&points[0], &points[1], &points[2], &points[3]);

        let corners = reconstruct(&distances, MM_PER_INCH).expect("valid quadrilateral");
        let recovered = corners.distances();
        for ((name, want), (_, got)) in distances.named().into_iter().zip(recovered.named()) {
            assert!((want - got).abs() <= 2.0, "{}: {} vs {}", name, want, got);
        }
    }

    #[test]
    fn inconsistent_redundant_distance_is_reported() {
        let mut distances = square_distances();
        distances.d12 = 150.0;
        let corners = reconstruct(&distances, MM_PER_INCH).expect("triangles are valid");
        let err = check_consistency(&corners, &distances, MM_PER_INCH, DEFAULT_TOLERANCE_PX)
            .unwrap_err();
        assert!(matches!(err, GeometryError::Inconsistent { pair: "d12", .. }));
    }

    #[test]
    fn parses_literal_coordinates() {
        assert_eq!(Point::parse("12,34").unwrap(), Point::new(12.0, 34.0));
        assert_eq!(Point::parse(" 1.5 , -2 ").unwrap(), Point::new(1.5, -2.0));
        assert!(Point::parse("12").is_err());
        assert!(Point::parse("1,2,3").is_err());
        assert!(Point::parse("a,b").is_err());
    }
}
