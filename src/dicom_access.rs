//
// dicom_access.rs
// Ceph-Tools-rs
//
// Uniform string access over file-backed and in-memory DICOM objects, with padding stripped.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::Tag;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, InMemDicomObject};

/// Text access shared by files opened for indexing and data sets built in memory.
pub trait ElementAccess {
    /// Value as text with trailing NUL/space padding removed; `None` when absent or empty.
    fn element_str(&self, tag: Tag) -> Option<String>;

    /// Transfer syntax from the file meta group, when there is one.
    fn transfer_syntax(&self) -> Option<String>;

    /// Like [`element_str`](Self::element_str), but an absent key attribute is an error naming it.
    fn required_str(&self, tag: Tag, name: &str) -> Result<String, String> {
        self.element_str(tag)
            .ok_or_else(|| format!("missing {} {}", name, tag))
    }
}

fn clean(text: &str) -> Option<String> {
    let text = text.trim_end_matches(['\0', ' ']).trim_start();
    (!text.is_empty()).then(|| text.to_string())
}

fn text_of(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let element = obj.element(tag).ok()?;
    clean(&element.to_str().ok()?)
}

impl ElementAccess for DefaultDicomObject {
    fn element_str(&self, tag: Tag) -> Option<String> {
        text_of(self, tag)
    }

    fn transfer_syntax(&self) -> Option<String> {
        clean(self.meta().transfer_syntax())
    }
}

impl ElementAccess for InMemDicomObject<StandardDataDictionary> {
    fn element_str(&self, tag: Tag) -> Option<String> {
        text_of(self, tag)
    }

    // a bare data set carries no meta group
    fn transfer_syntax(&self) -> Option<String> {
        None
    }
}
