//
// codes.rs
// Ceph-Tools-rs
//
// Coded entries (Code Sequence Macro) used by the cephalogram IODs, plus the character set they are written in.
//
// Thales Matheus Mendonça Santos - November 2025

pub const CHARACTER_SET: &str = "ISO_IR 100";

/// A coded entry (Code Sequence Macro).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeItem {
    pub value: &'static str,
    pub scheme: &'static str,
    pub scheme_version: Option<&'static str>,
    pub meaning: &'static str,
}

impl CodeItem {
    pub const fn new(value: &'static str, scheme: &'static str, meaning: &'static str) -> Self {
        Self {
            value,
            scheme,
            scheme_version: None,
            meaning,
        }
    }
}

/// Purpose of reference between the two images of a lateral/PA pair.
pub const OTHER_IMAGE_OF_BIPLANE_PAIR: CodeItem =
    CodeItem::new("121314", "DCM", "Other image of biplane pair");

/// Purpose of reference from an image to its fiducial set, and of each fiducial mark.
pub const FIDUCIAL_MARK: CodeItem = CodeItem {
    value: "112171",
    scheme: "DCM",
    scheme_version: Some("01"),
    meaning: "Fiducial mark",
};

pub const PATIENT_ERECT: CodeItem = CodeItem::new("F-10440", "SNM3", "ERECT");
pub const HEAD_NOS: CodeItem = CodeItem::new("T-D1100", "SNM3", "Head, NOS");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_codes() {
        assert_eq!(OTHER_IMAGE_OF_BIPLANE_PAIR.value, "121314");
        assert_eq!(OTHER_IMAGE_OF_BIPLANE_PAIR.scheme_version, None);
        assert_eq!(FIDUCIAL_MARK.value, "112171");
        assert_eq!(FIDUCIAL_MARK.scheme_version, Some("01"));
        assert_eq!(HEAD_NOS.scheme, "SNM3");
    }
}
