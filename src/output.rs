//
// output.rs
// Ceph-Tools-rs
//
// Writes cephalograms, fiducial sets and whole study sets as Part 10 files, plus the optional DICOMDIR.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use dicom::dictionary_std::uids;
use dicom::object::{FileMetaTable, FileMetaTableBuilder};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::cephalogram::CephalogramImage;
use crate::dataset::ToDataset;
use crate::dicomdir::FileSetDirectoryBuilder;
use crate::encapsulated::{write_encapsulated, EncapsulationSummary, DEFAULT_FRAGMENT_LIMIT};
use crate::error::{CephError, IdentifierError, Result};
use crate::fiducial::FiducialSet;
use crate::storage::OutputLayout;
use crate::stream::DicomStreamWriter;
use crate::study::StudySet;

#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Largest payload slice per Pixel Data fragment.
    pub fragment_limit: u32,
    pub write_dicomdir: bool,
    pub file_set_id: Option<String>,
    pub cancel: Option<CancelToken>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            fragment_limit: DEFAULT_FRAGMENT_LIMIT,
            write_dicomdir: true,
            file_set_id: None,
            cancel: None,
        }
    }
}

/// A study set that has been serialized. Holds the set read-only, plus where each member went.
#[derive(Debug)]
pub struct WrittenStudySet {
    set: StudySet,
    lateral: PathBuf,
    frontal: PathBuf,
    fiducials: PathBuf,
    dicomdir: Option<PathBuf>,
}

impl WrittenStudySet {
    pub fn set(&self) -> &StudySet {
        &self.set
    }

    pub fn lateral_path(&self) -> &Path {
        &self.lateral
    }

    pub fn frontal_path(&self) -> &Path {
        &self.frontal
    }

    pub fn fiducials_path(&self) -> &Path {
        &self.fiducials
    }

    pub fn dicomdir_path(&self) -> Option<&Path> {
        self.dicomdir.as_deref()
    }
}

fn file_meta<T: ToDataset>(object: &T, transfer_syntax: &str) -> Result<FileMetaTable> {
    let sop = object
        .sop_instance_uid()
        .ok_or(IdentifierError::Unassigned("SOP Instance UID"))?;
    FileMetaTableBuilder::new()
        .transfer_syntax(transfer_syntax)
        .media_storage_sop_class_uid(object.sop_class_uid())
        .media_storage_sop_instance_uid(sop.as_str())
        .build()
        .map_err(|e| CephError::Dicom(format!("file meta: {}", e)))
}

/// Runs `write` against `path` and deletes whatever it left behind if it fails.
fn discard_on_error<T>(path: &Path, write: impl FnOnce() -> Result<T>) -> Result<T> {
    let result = write();
    if result.is_err() && path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove partial file");
        }
    }
    result
}

/// Writes one DX image with its payload encapsulated under the image's transfer syntax.
pub fn write_cephalogram(
    image: &CephalogramImage,
    path: &Path,
    options: &WriteOptions,
) -> Result<EncapsulationSummary> {
    let dataset = image.to_dataset()?;
    let meta = file_meta(image, &image.pixel.transfer_syntax)?;
    let payload = File::open(image.payload()).map_err(|e| CephError::io(image.payload(), e))?;

    discard_on_error(path, || {
        let mut writer = DicomStreamWriter::create(path)?;
        writer.write_file_header(&meta)?;
        let summary = write_encapsulated(
            &mut writer,
            &dataset,
            BufReader::new(payload),
            options.fragment_limit,
            options.cancel.as_ref(),
        )?;
        writer.finish()?;
        info!(
            path = %path.display(),
            view = %image.view(),
            fragments = summary.fragments,
            "wrote cephalogram"
        );
        Ok(summary)
    })
}

/// Writes a Spatial Fiducials object. There is no pixel data.
pub fn write_fiducials(fiducials: &FiducialSet, path: &Path) -> Result<()> {
    let dataset = fiducials.to_dataset()?;
    let meta = file_meta(fiducials, uids::EXPLICIT_VR_LITTLE_ENDIAN)?;

    discard_on_error(path, || {
        let mut writer = DicomStreamWriter::create(path)?;
        writer.write_file_header(&meta)?;
        writer.write_dataset(&dataset)?;
        writer.finish()?;
        info!(path = %path.display(), label = %fiducials.label, "wrote fiducial set");
        Ok(())
    })
}

fn payload_name(image: &CephalogramImage) -> String {
    image
        .payload()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Serializes a [`StudySet`] into an [`OutputLayout`], exactly once.
pub struct StudySetWriter {
    layout: OutputLayout,
    options: WriteOptions,
}

impl StudySetWriter {
    pub fn new(layout: OutputLayout, options: WriteOptions) -> Self {
        Self { layout, options }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Writes both images, the fiducial set and, when enabled, the DICOMDIR.
    ///
    /// Consumes the set. If any member fails, every file already written for
    /// this set is removed and nothing is indexed.
    pub fn write(&self, set: StudySet) -> Result<WrittenStudySet> {
        let lateral = self.layout.lateral(&payload_name(set.lateral()))?;
        let frontal = self.layout.frontal(&payload_name(set.frontal()))?;
        let fiducials = self.layout.fiducials(&set.fiducials().label)?;

        let mut written: Vec<PathBuf> = Vec::with_capacity(3);
        let result = self.write_members(&set, &lateral, &frontal, &fiducials, &mut written);
        let dicomdir = match result {
            Ok(dicomdir) => dicomdir,
            Err(e) => {
                for path in &written {
                    if let Err(remove) = fs::remove_file(path) {
                        warn!(path = %path.display(), error = %remove, "could not remove written file");
                    }
                }
                return Err(e);
            }
        };

        info!(study = %set.study_uid(), root = %self.layout.root().display(), "study set written");
        Ok(WrittenStudySet {
            set: set.into_written(),
            lateral,
            frontal,
            fiducials,
            dicomdir,
        })
    }

    fn write_members(
        &self,
        set: &StudySet,
        lateral: &Path,
        frontal: &Path,
        fiducials: &Path,
        written: &mut Vec<PathBuf>,
    ) -> Result<Option<PathBuf>> {
        write_cephalogram(set.lateral(), lateral, &self.options)?;
        written.push(lateral.to_path_buf());
        write_cephalogram(set.frontal(), frontal, &self.options)?;
        written.push(frontal.to_path_buf());
        write_fiducials(set.fiducials(), fiducials)?;
        written.push(fiducials.to_path_buf());

        if !self.options.write_dicomdir {
            return Ok(None);
        }
        let mut builder = FileSetDirectoryBuilder::new(self.layout.root())?;
        if let Some(id) = &self.options.file_set_id {
            builder = builder.with_file_set_id(id.clone());
        }
        for path in [lateral, frontal, fiducials] {
            builder.add_instance(path)?;
        }
        if let Some(skipped) = builder.errors().first() {
            return Err(CephError::Dicom(format!("cannot index written file: {}", skipped)));
        }
        let dicomdir = self.layout.dicomdir();
        builder.write(&dicomdir)?;
        Ok(Some(dicomdir))
    }
}
