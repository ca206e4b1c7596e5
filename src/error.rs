//
// error.rs
// Ceph-Tools-rs
//
// Tagged error kinds for geometry, identifiers, assembly validation, configuration, and file I/O.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::PathBuf;

use thiserror::Error;

use crate::cephalogram::ViewPosition;

/// Result type for operations that can fail with any crate error.
pub type Result<T> = std::result::Result<T, CephError>;

/// A distance set that cannot describe four points in a plane.
///
/// Unrecoverable for the fiducial set it came from.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("distance {name} must be a finite, non-negative number of millimeters (got {value})")]
    InvalidDistance { name: &'static str, value: f64 },

    #[error("resolution must be a finite, positive dpi value (got {0})")]
    InvalidResolution(f64),

    #[error("distance d34 is zero: F3 and F4 coincide and no baseline can be placed")]
    DegenerateBaseline,

    /// The triangle inequality does not hold for one of the two construction triangles.
    #[error("triangle {triangle} violates the triangle inequality (radicand {radicand:.3} px²)")]
    TriangleInequality {
        triangle: &'static str,
        radicand: f64,
    },

    #[error(
        "reconstructed {pair} is {reconstructed:.2} px but {measured:.2} px was measured (tolerance {tolerance:.2} px)"
    )]
    Inconsistent {
        pair: &'static str,
        measured: f64,
        reconstructed: f64,
        tolerance: f64,
    },
}

/// UID reuse or conflict while threading the Study/Series/SOP hierarchy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("study UID conflict: {first} and {second} cannot share one cephalogram set")]
    StudyConflict { first: String, second: String },

    #[error("SOP instance UID {0} is carried by more than one member of the set")]
    SopConflict(String),

    #[error("invalid UID {0:?}")]
    InvalidUid(String),

    /// Serialization was attempted before the object was placed in a hierarchy.
    #[error("{0} has not been assigned")]
    Unassigned(&'static str),
}

/// Orientation or reference mismatch detected while assembling a study set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a cephalogram set needs one lateral and one PA/AP image (got {first} and {second})")]
    Orientation {
        first: ViewPosition,
        second: ViewPosition,
    },

    #[error("fiducial set declares {declared} referenced image(s) but the set policy requires {expected}")]
    ReferenceCount { declared: usize, expected: usize },

    #[error("fragment limit must be greater than zero")]
    FragmentLimit,
}

/// One missing or invalid configuration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub key: String,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Configuration errors, every offending key reported at once.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration {path:?}: {message}")]
    Source { path: PathBuf, message: String },

    #[error("invalid configuration {}: {}", .path.display(), join_issues(.issues))]
    Invalid {
        path: PathBuf,
        issues: Vec<ConfigIssue>,
    },
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A file skipped during a directory scan. Recoverable: the scan keeps going.
#[derive(Error, Debug)]
#[error("skipped {}: {reason}", .path.display())]
pub struct ScanError {
    pub path: PathBuf,
    pub reason: String,
}

/// Crate-level error.
#[derive(Error, Debug)]
pub enum CephError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure reported by the DICOM toolkit while encoding or parsing.
    #[error("DICOM error: {0}")]
    Dicom(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("operation cancelled after {completed} step(s)")]
    Cancelled { completed: usize },
}

impl CephError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CephError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller may skip the failing item and carry on with the rest.
    ///
    /// Only I/O failures qualify; everything else aborts the unit of work it belongs to.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CephError::Io { .. })
    }
}

impl From<dicom_object::ReadError> for CephError {
    fn from(e: dicom_object::ReadError) -> Self {
        CephError::Dicom(format!("{}", e))
    }
}

impl From<dicom_object::WriteError> for CephError {
    fn from(e: dicom_object::WriteError) -> Self {
        CephError::Dicom(format!("{}", e))
    }
}

impl From<dicom::encoding::encode::Error> for CephError {
    fn from(e: dicom::encoding::encode::Error) -> Self {
        CephError::Dicom(format!("{}", e))
    }
}

impl From<image::ImageError> for CephError {
    fn from(e: image::ImageError) -> Self {
        CephError::Image(format!("{}", e))
    }
}
