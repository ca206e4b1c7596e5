//
// models.rs
// Ceph-Tools-rs
//
// Serializable reports printed by the CLI (plain text or --json).
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::cephalogram::CephalogramImage;
use crate::dicomdir::FileSetDirectoryBuilder;
use crate::encapsulated::EncapsulationSummary;
use crate::fiducial::{FiducialSet, FiducialSource};
use crate::output::WrittenStudySet;

/// One written DX instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceReport {
    pub path: String,
    pub view: String,
    pub sop_instance_uid: Option<String>,
    pub series_instance_uid: Option<String>,
    pub rows: u16,
    pub columns: u16,
    pub magnification: f64,
    pub fragments: Option<usize>,
}

impl InstanceReport {
    pub fn new(image: &CephalogramImage, path: &Path, summary: Option<EncapsulationSummary>) -> Self {
        Self {
            path: path.display().to_string(),
            view: image.view().to_string(),
            sop_instance_uid: image.identity().sop.as_ref().map(ToString::to_string),
            series_instance_uid: image.identity().series.as_ref().map(ToString::to_string),
            rows: image.pixel.rows,
            columns: image.pixel.columns,
            magnification: image.positioning.magnification(),
            fragments: summary.map(|s| s.fragments),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkReport {
    pub id: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
}

/// Reconstructed (or literal) fiducial coordinates in pixels.
#[derive(Debug, Clone, Serialize)]
pub struct FiducialReport {
    pub label: String,
    pub dpi: f64,
    pub source: String,
    pub reference_count: usize,
    pub sop_instance_uid: Option<String>,
    pub marks: Vec<MarkReport>,
}

impl From<&FiducialSet> for FiducialReport {
    fn from(set: &FiducialSet) -> Self {
        let source = match set.source() {
            FiducialSource::Distances(_) => "distances",
            FiducialSource::Coordinates => "coordinates",
        };
        Self {
            label: set.label.clone(),
            dpi: set.dpi(),
            source: source.to_string(),
            reference_count: set.reference_count().count(),
            sop_instance_uid: set.identity().sop.as_ref().map(ToString::to_string),
            marks: set
                .marks()
                .iter()
                .map(|m| MarkReport {
                    id: m.id.code().to_string(),
                    label: m.id.label().to_string(),
                    x: m.point.x(),
                    y: m.point.y(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudySetReport {
    pub study_instance_uid: String,
    pub lateral: InstanceReport,
    pub frontal: InstanceReport,
    pub fiducials: FiducialReport,
    pub fiducials_path: String,
    pub dicomdir: Option<String>,
}

impl From<&WrittenStudySet> for StudySetReport {
    fn from(written: &WrittenStudySet) -> Self {
        let set = written.set();
        Self {
            study_instance_uid: set.study_uid().to_string(),
            lateral: InstanceReport::new(set.lateral(), written.lateral_path(), None),
            frontal: InstanceReport::new(set.frontal(), written.frontal_path(), None),
            fiducials: FiducialReport::from(set.fiducials()),
            fiducials_path: written.fiducials_path().display().to_string(),
            dicomdir: written.dicomdir_path().map(|p| p.display().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Outcome of indexing a file-set root.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub root: String,
    pub instances: usize,
    pub records: usize,
    pub dicomdir: String,
    pub skipped: Vec<SkippedFile>,
}

impl ScanReport {
    pub fn new(builder: &FileSetDirectoryBuilder, dicomdir: &Path) -> Self {
        Self {
            root: builder.root().display().to_string(),
            instances: builder.instance_count(),
            records: builder.records().len(),
            dicomdir: dicomdir.display().to_string(),
            skipped: builder
                .errors()
                .iter()
                .map(|e| SkippedFile {
                    path: e.path.display().to_string(),
                    reason: e.reason.clone(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for InstanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {} -> {}", self.view, self.path)?;
        writeln!(f, "    SOP Instance UID: {}", self.sop_instance_uid.as_deref().unwrap_or("N/A"))?;
        write!(
            f,
            "    {}x{} px, magnification {:.4}",
            self.columns, self.rows, self.magnification
        )?;
        if let Some(fragments) = self.fragments {
            write!(f, ", {} fragment(s)", fragments)?;
        }
        Ok(())
    }
}

impl fmt::Display for FiducialReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fiducials {:?} ({} dpi, from {})", self.label, self.dpi, self.source)?;
        for (i, mark) in self.marks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {} {:<12} ({:.0}, {:.0})", mark.id, mark.label, mark.x, mark.y)?;
        }
        Ok(())
    }
}

impl fmt::Display for StudySetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(80))?;
        writeln!(f, "Study Instance UID: {}", self.study_instance_uid)?;
        writeln!(f, "{}", "=".repeat(80))?;
        writeln!(f, "{}", self.lateral)?;
        writeln!(f, "{}", self.frontal)?;
        writeln!(f, "{}", self.fiducials)?;
        write!(f, "  -> {}", self.fiducials_path)?;
        if let Some(dicomdir) = &self.dicomdir {
            write!(f, "\nDICOMDIR: {}", dicomdir)?;
        }
        Ok(())
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Indexed {} instance(s) in {} record(s) under {} -> {}",
            self.instances, self.records, self.root, self.dicomdir
        )?;
        for skipped in &self.skipped {
            write!(f, "\n  skipped {}: {}", skipped.path, skipped.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiducial::tests::sample_fiducials;

    #[test]
    fn fiducial_report_lists_marks_in_order() {
        let report = FiducialReport::from(&sample_fiducials());
        let ids: Vec<_> = report.marks.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["TL", "TR", "BR", "BL"]);
        assert_eq!(report.source, "distances");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["marks"][1]["x"], 100.0);
        assert_eq!(json["marks"][1]["y"], 80.0);
        assert!(report.to_string().contains("Top Right"));
    }
}
