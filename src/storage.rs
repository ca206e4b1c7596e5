//
// storage.rs
// Ceph-Tools-rs
//
// File-set layout for a written cephalogram set, with DICOM-safe file identifiers.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::{Path, PathBuf};

use crate::dicomdir::DICOMDIR_NAME;
use crate::error::{CephError, Result};

/// Longest component a Referenced File ID may carry.
pub const MAX_FILE_ID_LEN: usize = 8;

const LATERAL_DIR: &str = "CEPH1";
const FRONTAL_DIR: &str = "CEPH2";
const FIDUCIAL_DIR: &str = "FIDUCIAL";

/// Where each member of a study set lands under the output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| CephError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lateral(&self, name: &str) -> Result<PathBuf> {
        self.member(LATERAL_DIR, name)
    }

    pub fn frontal(&self, name: &str) -> Result<PathBuf> {
        self.member(FRONTAL_DIR, name)
    }

    pub fn fiducials(&self, name: &str) -> Result<PathBuf> {
        self.member(FIDUCIAL_DIR, name)
    }

    pub fn dicomdir(&self) -> PathBuf {
        self.root.join(DICOMDIR_NAME)
    }

    fn member(&self, dir: &str, name: &str) -> Result<PathBuf> {
        let dir = self.root.join(dir);
        fs::create_dir_all(&dir).map_err(|e| CephError::io(&dir, e))?;
        Ok(dir.join(file_id_component(name)))
    }
}

/// Maps an arbitrary name onto a file ID component: upper-case A-Z, 0-9 and
/// underscore, at most eight characters.
///
/// The extension is dropped. Names with nothing usable become `CEPH`.
pub fn file_id_component(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let cleaned: String = stem
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => Some(c.to_ascii_uppercase()),
            '-' | ' ' | '.' => Some('_'),
            _ => None,
        })
        .take(MAX_FILE_ID_LEN)
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "CEPH".to_string()
    } else {
        cleaned
    }
}
