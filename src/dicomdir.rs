//
// dicomdir.rs
// Ceph-Tools-rs
//
// Builds the Patient/Study/Series/Instance record tree of a file-set and writes it as a DICOMDIR.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use dicom::core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::{CephError, Result, ScanError};
use crate::metadata::{read_instance_header, InstanceHeader};
use crate::stream::{encode_dataset, DicomStreamWriter};
use crate::uid;

pub const DICOMDIR_NAME: &str = "DICOMDIR";

const RECORD_IN_USE: u16 = 0xFFFF;
// tag + VR + reserved + 32-bit length
const SEQUENCE_HEADER_LEN: u64 = 12;
const ITEM_HEADER_LEN: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordLevel {
    Patient,
    Study,
    Series,
    Instance,
}

/// One node of the directory tree. Children keep insertion order.
#[derive(Debug, Clone)]
pub struct DirectoryRecord {
    level: RecordLevel,
    record_type: &'static str,
    attributes: InMemDicomObject,
    file_id: Vec<String>,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl DirectoryRecord {
    pub fn level(&self) -> RecordLevel {
        self.level
    }

    /// Directory Record Type, e.g. `PATIENT` or `FIDUCIAL`.
    pub fn record_type(&self) -> &'static str {
        self.record_type
    }

    /// Attributes mirrored from the referenced object, without the link fields.
    pub fn attributes(&self) -> &InMemDicomObject {
        &self.attributes
    }

    /// Path components relative to the file-set root; empty above Instance level.
    pub fn file_id(&self) -> &[String] {
        &self.file_id
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Links {
    next: u32,
    lower: u32,
}

/// Indexes written instances under one file-set root.
///
/// Records are kept in an arena; Patient, Study and Series nodes are keyed by
/// Patient ID, Study UID and Series UID so re-indexing never duplicates them.
pub struct FileSetDirectoryBuilder {
    root: PathBuf,
    file_set_id: Option<String>,
    cancel: Option<CancelToken>,
    records: Vec<DirectoryRecord>,
    roots: Vec<usize>,
    patients: HashMap<String, usize>,
    studies: HashMap<String, usize>,
    series: HashMap<String, usize>,
    indexed: HashSet<PathBuf>,
    errors: Vec<ScanError>,
}

impl FileSetDirectoryBuilder {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| CephError::io(root, e))?;
        Ok(Self {
            root,
            file_set_id: None,
            cancel: None,
            records: Vec::new(),
            roots: Vec::new(),
            patients: HashMap::new(),
            studies: HashMap::new(),
            series: HashMap::new(),
            indexed: HashSet::new(),
            errors: Vec::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_file_set_id(mut self, id: impl Into<String>) -> Self {
        self.file_set_id = Some(id.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records(&self) -> &[DirectoryRecord] {
        &self.records
    }

    /// Indices of the Patient records, in insertion order.
    pub fn root_records(&self) -> &[usize] {
        &self.roots
    }

    /// Files skipped so far, with the reason each one was rejected.
    pub fn errors(&self) -> &[ScanError] {
        &self.errors
    }

    pub fn instance_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.level == RecordLevel::Instance)
            .count()
    }

    /// Indexes a file, or every file below a directory in name order.
    ///
    /// Returns how many new instances were added. Files that cannot be indexed
    /// are recorded in [`errors`](Self::errors) and skipped; a path already
    /// indexed is a no-op.
    pub fn add_instance(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        if !path.is_dir() {
            self.check_cancelled(0)?;
            return Ok(usize::from(self.add_file(path)));
        }

        let mut added = 0;
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let failed = e.path().unwrap_or(path).to_path_buf();
                    self.skip(failed, format!("cannot visit: {}", e));
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() == DICOMDIR_NAME {
                continue;
            }
            self.check_cancelled(added)?;
            if self.add_file(entry.path()) {
                added += 1;
            }
        }
        Ok(added)
    }

    fn check_cancelled(&self, completed: usize) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(CephError::Cancelled { completed });
        }
        Ok(())
    }

    fn skip(&mut self, path: PathBuf, reason: String) {
        warn!(path = %path.display(), %reason, "skipping file");
        self.errors.push(ScanError { path, reason });
    }

    fn add_file(&mut self, path: &Path) -> bool {
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                self.skip(path.to_path_buf(), format!("cannot resolve path: {}", e));
                return false;
            }
        };
        if self.indexed.contains(&canonical) {
            debug!(path = %path.display(), "already indexed");
            return false;
        }
        let file_id = match file_id_components(&self.root, &canonical) {
            Some(id) => id,
            None => {
                self.skip(path.to_path_buf(), "outside the file-set root".into());
                return false;
            }
        };
        let header = match read_instance_header(&canonical) {
            Ok(header) => header,
            Err(e) => {
                self.skip(e.path, e.reason);
                return false;
            }
        };

        if let Some(reason) = self.misplacement(&header) {
            self.skip(path.to_path_buf(), reason);
            return false;
        }
        self.insert(header, file_id);
        self.indexed.insert(canonical);
        true
    }

    /// Checks that an already indexed study or series would not move under another parent.
    fn misplacement(&self, header: &InstanceHeader) -> Option<String> {
        let patient = self.patients.get(&header.patient_id).copied();
        let study = self.studies.get(&header.study_uid).copied();
        if let Some(existing) = study {
            if self.records[existing].parent != patient {
                return Some(format!(
                    "study {} is already indexed under another patient than {}",
                    header.study_uid, header.patient_id
                ));
            }
        }
        if let Some(existing) = self.series.get(&header.series_uid) {
            if self.records[*existing].parent != study {
                return Some(format!(
                    "series {} is already indexed under another study than {}",
                    header.series_uid, header.study_uid
                ));
            }
        }
        None
    }

    fn insert(&mut self, header: InstanceHeader, file_id: Vec<String>) {
        let patient = match self.patients.get(&header.patient_id) {
            Some(&idx) => idx,
            None => {
                let idx = self.push(RecordLevel::Patient, "PATIENT", patient_attributes(&header), None, Vec::new());
                self.patients.insert(header.patient_id.clone(), idx);
                idx
            }
        };
        let study = match self.studies.get(&header.study_uid) {
            Some(&idx) => idx,
            None => {
                let idx = self.push(RecordLevel::Study, "STUDY", study_attributes(&header), Some(patient), Vec::new());
                self.studies.insert(header.study_uid.clone(), idx);
                idx
            }
        };
        let series = match self.series.get(&header.series_uid) {
            Some(&idx) => idx,
            None => {
                let idx = self.push(RecordLevel::Series, "SERIES", series_attributes(&header), Some(study), Vec::new());
                self.series.insert(header.series_uid.clone(), idx);
                idx
            }
        };

        let record_type = if header.sop_class_uid == uids::SPATIAL_FIDUCIALS_STORAGE {
            "FIDUCIAL"
        } else {
            "IMAGE"
        };
        debug!(sop = %header.sop_instance_uid, file = %file_id.join("/"), "indexed instance");
        let attributes = instance_attributes(&header, &file_id);
        self.push(RecordLevel::Instance, record_type, attributes, Some(series), file_id);
    }

    fn push(
        &mut self,
        level: RecordLevel,
        record_type: &'static str,
        attributes: InMemDicomObject,
        parent: Option<usize>,
        file_id: Vec<String>,
    ) -> usize {
        let idx = self.records.len();
        self.records.push(DirectoryRecord {
            level,
            record_type,
            attributes,
            file_id,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.records[p].children.push(idx),
            None => self.roots.push(idx),
        }
        idx
    }

    /// Records in the order they are serialized: depth first, parents before children.
    fn serialization_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.records.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.records[idx].children.iter().rev().copied());
        }
        order
    }

    fn record_dataset(&self, idx: usize, links: Links) -> InMemDicomObject {
        let record = &self.records[idx];
        let mut obj = record.attributes.clone();
        obj.put(DataElement::new(
            tags::OFFSET_OF_THE_NEXT_DIRECTORY_RECORD,
            VR::UL,
            PrimitiveValue::from(links.next),
        ));
        obj.put(DataElement::new(
            tags::RECORD_IN_USE_FLAG,
            VR::US,
            PrimitiveValue::from(RECORD_IN_USE),
        ));
        obj.put(DataElement::new(
            tags::OFFSET_OF_REFERENCED_LOWER_LEVEL_DIRECTORY_ENTITY,
            VR::UL,
            PrimitiveValue::from(links.lower),
        ));
        obj.put(DataElement::new(
            tags::DIRECTORY_RECORD_TYPE,
            VR::CS,
            PrimitiveValue::from(record.record_type),
        ));
        obj
    }

    fn head_dataset(&self, first: u32, last: u32) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            tags::FILE_SET_ID,
            VR::CS,
            PrimitiveValue::from(self.file_set_id.clone().unwrap_or_default()),
        ));
        obj.put(DataElement::new(
            tags::OFFSET_OF_THE_FIRST_DIRECTORY_RECORD_OF_THE_ROOT_DIRECTORY_ENTITY,
            VR::UL,
            PrimitiveValue::from(first),
        ));
        obj.put(DataElement::new(
            tags::OFFSET_OF_THE_LAST_DIRECTORY_RECORD_OF_THE_ROOT_DIRECTORY_ENTITY,
            VR::UL,
            PrimitiveValue::from(last),
        ));
        obj.put(DataElement::new(
            tags::FILE_SET_CONSISTENCY_FLAG,
            VR::US,
            PrimitiveValue::from(0u16),
        ));
        obj
    }

    /// Writes the tree as a Part 10 DICOMDIR. A partial file is removed on failure.
    pub fn write(&self, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        let result = self.write_to(destination);
        if result.is_err() {
            let _ = fs::remove_file(destination);
        }
        result
    }

    fn write_to(&self, destination: &Path) -> Result<()> {
        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::MEDIA_STORAGE_DIRECTORY_STORAGE)
            .media_storage_sop_instance_uid(uid::allocate().as_str())
            .build()
            .map_err(|e| CephError::Dicom(format!("DICOMDIR file meta: {}", e)))?;

        let mut writer = DicomStreamWriter::create(destination)?;
        writer.write_file_header(&meta)?;

        // Offsets are fixed-width, so every record encodes to the same length
        // whatever links it carries. Measure first, then place.
        let order = self.serialization_order();
        let mut lengths = vec![0u64; self.records.len()];
        for &idx in &order {
            lengths[idx] = encode_dataset(&self.record_dataset(idx, Links::default()))?.len() as u64;
        }
        let head_len = encode_dataset(&self.head_dataset(0, 0))?.len() as u64;

        let mut offsets = vec![0u32; self.records.len()];
        let mut cursor = writer.position() + head_len + SEQUENCE_HEADER_LEN;
        for &idx in &order {
            offsets[idx] = u32::try_from(cursor)
                .map_err(|_| CephError::Dicom("DICOMDIR exceeds 4 GiB".into()))?;
            cursor += ITEM_HEADER_LEN + lengths[idx];
        }

        let first = self.roots.first().map_or(0, |&r| offsets[r]);
        let last = self.roots.last().map_or(0, |&r| offsets[r]);
        writer.write_dataset(&self.head_dataset(first, last))?;
        writer.write_element_header(tags::DIRECTORY_RECORD_SEQUENCE, VR::SQ, Length::UNDEFINED)?;

        for &idx in &order {
            let links = Links {
                next: self.next_sibling(idx).map_or(0, |s| offsets[s]),
                lower: self.records[idx].children.first().map_or(0, |&c| offsets[c]),
            };
            let bytes = encode_dataset(&self.record_dataset(idx, links))?;
            if bytes.len() as u64 != lengths[idx] || writer.position() != u64::from(offsets[idx]) {
                return Err(CephError::Dicom(format!(
                    "directory record {} moved while linking",
                    idx
                )));
            }
            writer.write_item_header(bytes.len() as u32)?;
            writer.write_raw(&bytes)?;
        }
        writer.write_sequence_delimiter()?;
        writer.finish()?;

        info!(
            path = %destination.display(),
            records = self.records.len(),
            instances = self.instance_count(),
            "wrote DICOMDIR"
        );
        Ok(())
    }

    fn next_sibling(&self, idx: usize) -> Option<usize> {
        let siblings = match self.records[idx].parent {
            Some(p) => &self.records[p].children,
            None => &self.roots,
        };
        let pos = siblings.iter().position(|&s| s == idx)?;
        siblings.get(pos + 1).copied()
    }
}

fn file_id_components(root: &Path, path: &Path) -> Option<Vec<String>> {
    let relative = path.strip_prefix(root).ok()?;
    let components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!components.is_empty()).then_some(components)
}

fn put(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: Option<&str>) {
    let value = value.map_or(PrimitiveValue::Empty, PrimitiveValue::from);
    obj.put(DataElement::new(tag, vr, value));
}

fn patient_attributes(h: &InstanceHeader) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    put(&mut obj, tags::PATIENT_NAME, VR::PN, h.patient_name.as_deref());
    put(&mut obj, tags::PATIENT_ID, VR::LO, Some(h.patient_id.as_str()));
    obj
}

fn study_attributes(h: &InstanceHeader) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    put(&mut obj, tags::STUDY_DATE, VR::DA, h.study_date.as_deref());
    put(&mut obj, tags::STUDY_TIME, VR::TM, h.study_time.as_deref());
    put(&mut obj, tags::STUDY_DESCRIPTION, VR::LO, h.study_description.as_deref());
    put(&mut obj, tags::STUDY_INSTANCE_UID, VR::UI, Some(h.study_uid.as_str()));
    put(&mut obj, tags::STUDY_ID, VR::SH, h.study_id.as_deref());
    obj
}

fn series_attributes(h: &InstanceHeader) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    put(&mut obj, tags::MODALITY, VR::CS, h.modality.as_deref());
    put(&mut obj, tags::SERIES_INSTANCE_UID, VR::UI, Some(h.series_uid.as_str()));
    put(&mut obj, tags::SERIES_NUMBER, VR::IS, h.series_number.as_deref());
    obj
}

fn instance_attributes(h: &InstanceHeader, file_id: &[String]) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(
        tags::REFERENCED_FILE_ID,
        VR::CS,
        PrimitiveValue::Strs(file_id.iter().cloned().collect()),
    ));
    put(&mut obj, tags::REFERENCED_SOP_CLASS_UID_IN_FILE, VR::UI, Some(h.sop_class_uid.as_str()));
    put(&mut obj, tags::REFERENCED_SOP_INSTANCE_UID_IN_FILE, VR::UI, Some(h.sop_instance_uid.as_str()));
    put(&mut obj, tags::REFERENCED_TRANSFER_SYNTAX_UID_IN_FILE, VR::UI, Some(h.transfer_syntax.as_str()));
    put(&mut obj, tags::INSTANCE_NUMBER, VR::IS, h.instance_number.as_deref());
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::dictionary_std::StandardDataDictionary;
    use dicom::object::{open_file, FileDicomObject};
    use tempfile::tempdir;

    struct Ids<'a> {
        patient: &'a str,
        study: &'a str,
        series: &'a str,
        sop: &'a str,
        class: &'a str,
    }

    fn write_instance(path: &Path, ids: Ids<'_>) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(ids.class)
            .media_storage_sop_instance_uid(ids.sop)
            .build()
            .expect("meta");
        let mut obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
        let mut put_str = |tag, vr, value: &str| {
            obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
        };
        put_str(tags::SOP_CLASS_UID, VR::UI, ids.class);
        put_str(tags::SOP_INSTANCE_UID, VR::UI, ids.sop);
        put_str(tags::STUDY_DATE, VR::DA, "20251103");
        put_str(tags::MODALITY, VR::CS, "DX");
        put_str(tags::PATIENT_NAME, VR::PN, "DOE^JANE");
        put_str(tags::PATIENT_ID, VR::LO, ids.patient);
        put_str(tags::STUDY_INSTANCE_UID, VR::UI, ids.study);
        put_str(tags::SERIES_INSTANCE_UID, VR::UI, ids.series);
        put_str(tags::INSTANCE_NUMBER, VR::IS, "1");
        obj.write_to_file(path).expect("write instance");
    }

    fn populated_root() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let ids = |series, sop, class| Ids {
            patient: "B1893",
            study: "1.2.826.0.1.3680043.9.7",
            series,
            sop,
            class,
        };
        write_instance(
            &dir.path().join("CEPH1").join("LATERAL"),
            ids(
                "1.2.826.0.1.3680043.9.7.1",
                "1.2.826.0.1.3680043.9.7.1.1",
                uids::DIGITAL_X_RAY_IMAGE_STORAGE_FOR_PROCESSING,
            ),
        );
        write_instance(
            &dir.path().join("CEPH2").join("FRONTAL"),
            ids(
                "1.2.826.0.1.3680043.9.7.2",
                "1.2.826.0.1.3680043.9.7.2.1",
                uids::DIGITAL_X_RAY_IMAGE_STORAGE_FOR_PROCESSING,
            ),
        );
        write_instance(
            &dir.path().join("FIDUCIAL").join("MARKS"),
            ids("1.2.826.0.1.3680043.9.7.3", "1.2.826.0.1.3680043.9.7.3.1", uids::SPATIAL_FIDUCIALS_STORAGE),
        );
        dir
    }

    fn count(builder: &FileSetDirectoryBuilder, level: RecordLevel) -> usize {
        builder.records().iter().filter(|r| r.level() == level).count()
    }

    #[test]
    fn indexing_the_same_file_twice_is_a_no_op() {
        let dir = populated_root();
        let file = dir.path().join("CEPH1").join("LATERAL");
        let mut builder = FileSetDirectoryBuilder::new(dir.path()).unwrap();

        assert_eq!(builder.add_instance(&file).unwrap(), 1);
        assert_eq!(builder.add_instance(&file).unwrap(), 0);
        assert_eq!(builder.instance_count(), 1);
        assert_eq!(count(&builder, RecordLevel::Patient), 1);
        assert_eq!(count(&builder, RecordLevel::Study), 1);
        assert_eq!(count(&builder, RecordLevel::Series), 1);
    }

    #[test]
    fn directories_share_ancestors_and_keep_file_ids() {
        let dir = populated_root();
        let mut builder = FileSetDirectoryBuilder::new(dir.path()).unwrap();

        assert_eq!(builder.add_instance(dir.path()).unwrap(), 3);
        assert_eq!(count(&builder, RecordLevel::Patient), 1);
        assert_eq!(count(&builder, RecordLevel::Study), 1);
        assert_eq!(count(&builder, RecordLevel::Series), 3);

        let instances: Vec<_> = builder
            .records()
            .iter()
            .filter(|r| r.level() == RecordLevel::Instance)
            .collect();
        assert_eq!(instances[0].file_id(), ["CEPH1", "LATERAL"]);
        assert_eq!(instances[0].record_type(), "IMAGE");
        assert_eq!(instances[2].file_id(), ["FIDUCIAL", "MARKS"]);
        assert_eq!(instances[2].record_type(), "FIDUCIAL");

        for record in instances {
            let series = &builder.records()[record.parent().unwrap()];
            let study = &builder.records()[series.parent().unwrap()];
            let patient = &builder.records()[study.parent().unwrap()];
            assert_eq!(patient.level(), RecordLevel::Patient);
            assert!(patient.parent().is_none());
        }

        // re-adding the whole tree changes nothing
        assert_eq!(builder.add_instance(dir.path()).unwrap(), 0);
        assert_eq!(builder.records().len(), 1 + 1 + 3 + 3);
    }

    #[test]
    fn unreadable_files_are_recorded_and_skipped() {
        let dir = populated_root();
        fs::write(dir.path().join("README"), b"plain text").unwrap();
        let mut builder = FileSetDirectoryBuilder::new(dir.path()).unwrap();

        assert_eq!(builder.add_instance(dir.path()).unwrap(), 3);
        assert_eq!(builder.errors().len(), 1);
        assert!(builder.errors()[0].path.ends_with("README"));
    }

    #[test]
    fn files_outside_the_root_are_rejected() {
        let outside = populated_root();
        let root = tempdir().unwrap();
        let mut builder = FileSetDirectoryBuilder::new(root.path()).unwrap();

        let added = builder
            .add_instance(outside.path().join("CEPH1").join("LATERAL"))
            .unwrap();
        assert_eq!(added, 0);
        assert_eq!(builder.errors().len(), 1);
    }

    #[test]
    fn cancellation_aborts_between_files() {
        let dir = populated_root();
        let token = CancelToken::new();
        token.cancel();
        let mut builder = FileSetDirectoryBuilder::new(dir.path())
            .unwrap()
            .with_cancel(token);

        let err = builder.add_instance(dir.path()).unwrap_err();
        assert!(matches!(err, CephError::Cancelled { completed: 0 }));
        assert_eq!(builder.instance_count(), 0);
    }

    #[test]
    fn written_offsets_point_at_item_tags() {
        let dir = populated_root();
        let mut builder = FileSetDirectoryBuilder::new(dir.path())
            .unwrap()
            .with_file_set_id("CEPHSET");
        builder.add_instance(dir.path()).unwrap();
        let dicomdir = dir.path().join(DICOMDIR_NAME);
        builder.write(&dicomdir).unwrap();

        let bytes = fs::read(&dicomdir).unwrap();
        let item_at = |offset: u32| {
            let at = offset as usize;
            assert_eq!(&bytes[at..at + 4], &[0xFE, 0xFF, 0x00, 0xE0], "offset {}", offset);
        };

        let obj = open_file(&dicomdir).unwrap();
        assert_eq!(
            obj.meta().media_storage_sop_class_uid(),
            uids::MEDIA_STORAGE_DIRECTORY_STORAGE
        );
        let offset = |obj: &InMemDicomObject, tag| -> u32 { obj.element(tag).unwrap().to_int().unwrap() };
        let first = offset(&obj, tags::OFFSET_OF_THE_FIRST_DIRECTORY_RECORD_OF_THE_ROOT_DIRECTORY_ENTITY);
        let last = offset(&obj, tags::OFFSET_OF_THE_LAST_DIRECTORY_RECORD_OF_THE_ROOT_DIRECTORY_ENTITY);
        assert_eq!(first, last);
        item_at(first);

        let records = obj.element(tags::DIRECTORY_RECORD_SEQUENCE).unwrap().items().unwrap();
        assert_eq!(records.len(), 8);
        let mut linked = 0;
        for record in records {
            for tag in [
                tags::OFFSET_OF_THE_NEXT_DIRECTORY_RECORD,
                tags::OFFSET_OF_REFERENCED_LOWER_LEVEL_DIRECTORY_ENTITY,
            ] {
                let at = offset(record, tag);
                if at != 0 {
                    item_at(at);
                    linked += 1;
                }
            }
        }
        // patient and study point down once each, the series chain twice
        // sideways and once down per series
        assert_eq!(linked, 2 + 2 + 3);

        let kinds: Vec<String> = records
            .iter()
            .map(|r| r.element(tags::DIRECTORY_RECORD_TYPE).unwrap().to_str().unwrap().trim().to_string())
            .collect();
        assert_eq!(
            kinds,
            ["PATIENT", "STUDY", "SERIES", "IMAGE", "SERIES", "IMAGE", "SERIES", "FIDUCIAL"]
        );
    }

    #[test]
    fn study_claimed_by_another_patient_is_skipped() {
        let dir = populated_root();
        write_instance(
            &dir.path().join("OTHER").join("LATERAL"),
            Ids {
                patient: "C2001",
                study: "1.2.826.0.1.3680043.9.7",
                series: "1.2.826.0.1.3680043.9.7.9",
                sop: "1.2.826.0.1.3680043.9.7.9.1",
                class: uids::DIGITAL_X_RAY_IMAGE_STORAGE_FOR_PROCESSING,
            },
        );
        let mut builder = FileSetDirectoryBuilder::new(dir.path()).unwrap();

        // CEPH1..FIDUCIAL sort before OTHER
        assert_eq!(builder.add_instance(dir.path()).unwrap(), 3);
        assert_eq!(builder.errors().len(), 1);
        assert!(builder.errors()[0].path.ends_with("OTHER/LATERAL"));
        assert_eq!(count(&builder, RecordLevel::Patient), 1);
        assert_eq!(count(&builder, RecordLevel::Series), 3);
        assert!(builder
            .records()
            .iter()
            .all(|r| r.level() == RecordLevel::Instance || !r.children().is_empty()));
    }
}
