//
// uid.rs
// Ceph-Tools-rs
//
// Allocates process-unique UIDs and threads one Study/Series/SOP hierarchy through a cephalogram set.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dicom::dictionary_std::uids;
use serde::{Serialize, Serializer};
use tracing::debug;
use uuid::Uuid;

use crate::cephalogram::CephalogramImage;
use crate::codes::{CodeItem, FIDUCIAL_MARK, OTHER_IMAGE_OF_BIPLANE_PAIR};
use crate::error::IdentifierError;
use crate::fiducial::FiducialSet;

/// UID root for UUID-derived identifiers (PS3.5 B.2).
const UUID_ROOT: &str = "2.25";

const MAX_UID_LEN: usize = 64;

/// A syntactically valid DICOM unique identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(String);

impl Uid {
    /// Validates dotted-decimal syntax: non-empty numeric components, no leading zeros, at most 64 chars.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let s = s.trim_end_matches(['\0', ' ']);
        let valid_component =
            |c: &str| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit()) && (c == "0" || !c.starts_with('0'));
        if s.is_empty() || s.len() > MAX_UID_LEN || !s.split('.').all(valid_component) {
            return Err(IdentifierError::InvalidUid(s.to_string()));
        }
        Ok(Uid(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Uid {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uid::parse(s)
    }
}

impl Serialize for Uid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Hands out `2.25.<n>` UIDs that never repeat for the allocator's lifetime.
///
/// `n` is a random 128-bit base XOR-ed with an atomic counter, so two calls can never
/// produce the same value and concurrent callers need no extra locking.
#[derive(Debug)]
pub struct UidAllocator {
    base: u128,
    counter: AtomicU64,
}

impl UidAllocator {
    pub fn new() -> Self {
        Self {
            base: Uuid::new_v4().as_u128(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn allocate(&self) -> Uid {
        let n = self.base ^ u128::from(self.counter.fetch_add(1, Ordering::Relaxed));
        Uid(format!("{}.{}", UUID_ROOT, n))
    }
}

impl Default for UidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn process_allocator() -> &'static Arc<UidAllocator> {
    static ALLOCATOR: OnceLock<Arc<UidAllocator>> = OnceLock::new();
    ALLOCATOR.get_or_init(|| Arc::new(UidAllocator::new()))
}

/// Allocates a UID from the process-wide allocator.
pub fn allocate() -> Uid {
    process_allocator().allocate()
}

/// Study, Series and SOP Instance UIDs of one composite object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub study: Option<Uid>,
    pub series: Option<Uid>,
    pub sop: Option<Uid>,
}

/// A reference from one instance to another, with an optional purpose of reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceReference {
    pub sop_class_uid: &'static str,
    pub sop_instance_uid: Uid,
    pub purpose: Option<CodeItem>,
}

impl InstanceReference {
    pub fn image(sop_instance_uid: Uid) -> Self {
        Self {
            sop_class_uid: uids::DIGITAL_X_RAY_IMAGE_STORAGE_FOR_PROCESSING,
            sop_instance_uid,
            purpose: None,
        }
    }
}

/// UID allocation and propagation policy for cephalogram sets.
#[derive(Debug, Clone)]
pub struct IdentifierHierarchy {
    allocator: Arc<UidAllocator>,
}

impl Default for IdentifierHierarchy {
    fn default() -> Self {
        Self {
            allocator: Arc::clone(process_allocator()),
        }
    }
}

impl IdentifierHierarchy {
    pub fn new(allocator: Arc<UidAllocator>) -> Self {
        Self { allocator }
    }

    pub fn allocate(&self) -> Uid {
        self.allocator.allocate()
    }

    /// Gives a lone cephalogram (no partner, no fiducials) a complete identity.
    pub fn assign_standalone(&self, image: &mut CephalogramImage) {
        let identity = image.identity_mut();
        identity.study.get_or_insert_with(|| self.allocator.allocate());
        identity.series.get_or_insert_with(|| self.allocator.allocate());
        identity.sop.get_or_insert_with(|| self.allocator.allocate());
    }

    /// Threads one Study UID through both images and the fiducial set and wires their cross-references.
    ///
    /// A Study UID already carried by any member is reused; two different ones are a conflict.
    /// With `shared_series` all three objects get one Series UID, otherwise each gets its own.
    /// Missing SOP Instance UIDs are allocated; the three SOP UIDs must end up distinct. The fiducial set references the first
    /// `reference_count` images, starting with `image_a`. Returns the shared Study UID.
    pub fn assign_to_study_set(
        &self,
        image_a: &mut CephalogramImage,
        image_b: &mut CephalogramImage,
        fiducials: &mut FiducialSet,
        shared_series: bool,
    ) -> Result<Uid, IdentifierError> {
        let study = self.resolve_study(&[
            image_a.identity().study.as_ref(),
            image_b.identity().study.as_ref(),
            fiducials.identity().study.as_ref(),
        ])?;

        let (series_a, series_b, series_f) = if shared_series {
            let series = self.allocator.allocate();
            (series.clone(), series.clone(), series)
        } else {
            (
                self.allocator.allocate(),
                self.allocator.allocate(),
                self.allocator.allocate(),
            )
        };

        let sop_a = self.fill(image_a.identity_mut(), &study, series_a);
        let sop_b = self.fill(image_b.identity_mut(), &study, series_b);
        let sop_f = self.fill(fiducials.identity_mut(), &study, series_f);
        if sop_a == sop_b || sop_a == sop_f {
            return Err(IdentifierError::SopConflict(sop_a.to_string()));
        }
        if sop_b == sop_f {
            return Err(IdentifierError::SopConflict(sop_b.to_string()));
        }

        image_a.set_other_image(biplane_reference(sop_b.clone()));
        image_b.set_other_image(biplane_reference(sop_a.clone()));
        image_a.set_fiducial_reference(fiducial_reference(sop_f.clone()));
        image_b.set_fiducial_reference(fiducial_reference(sop_f));

        let calibrated = [sop_a, sop_b];
        let count = fiducials.reference_count().count();
        fiducials.set_referenced_images(calibrated.into_iter().take(count).collect());

        debug!(study = %study, shared_series, "assigned study set identifiers");
        Ok(study)
    }

    fn fill(&self, identity: &mut Identity, study: &Uid, series: Uid) -> Uid {
        identity.study = Some(study.clone());
        identity.series = Some(series);
        identity
            .sop
            .get_or_insert_with(|| self.allocator.allocate())
            .clone()
    }

    fn resolve_study(&self, existing: &[Option<&Uid>]) -> Result<Uid, IdentifierError> {
        let mut chosen: Option<&Uid> = None;
        for uid in existing.iter().flatten() {
            match chosen {
                Some(first) if first != *uid => {
                    return Err(IdentifierError::StudyConflict {
                        first: first.to_string(),
                        second: uid.to_string(),
                    })
                }
                _ => chosen = Some(uid),
            }
        }
        Ok(chosen
            .cloned()
            .unwrap_or_else(|| self.allocator.allocate()))
    }
}

fn biplane_reference(sop: Uid) -> InstanceReference {
    InstanceReference {
        sop_class_uid: uids::DIGITAL_X_RAY_IMAGE_STORAGE_FOR_PROCESSING,
        sop_instance_uid: sop,
        purpose: Some(OTHER_IMAGE_OF_BIPLANE_PAIR),
    }
}

fn fiducial_reference(sop: Uid) -> InstanceReference {
    InstanceReference {
        sop_class_uid: uids::SPATIAL_FIDUCIALS_STORAGE,
        sop_instance_uid: sop,
        purpose: Some(FIDUCIAL_MARK),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn allocated_uids_are_valid_and_distinct() {
        let allocator = UidAllocator::new();
        let uids: Vec<Uid> = (0..1000).map(|_| allocator.allocate()).collect();
        let unique: HashSet<&Uid> = uids.iter().collect();
        assert_eq!(unique.len(), uids.len());
        for uid in &uids {
            assert!(uid.as_str().starts_with("2.25."));
            assert!(uid.as_str().len() <= MAX_UID_LEN);
            assert_eq!(Uid::parse(uid.as_str()).as_ref(), Ok(uid));
        }
    }

    #[test]
    fn concurrent_allocation_never_repeats() {
        let allocator = Arc::new(UidAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                thread::spawn(move || (0..250).map(|_| allocator.allocate()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for uid in handle.join().expect("allocator thread") {
                assert!(seen.insert(uid));
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn uid_syntax_is_checked() {
        assert!(Uid::parse("1.2.840.10008.5.1.4.1.1.66.2").is_ok());
        assert!(Uid::parse("1.2.840.10008.1.2.1\0").is_ok());
        assert!(Uid::parse("").is_err());
        assert!(Uid::parse("1..2").is_err());
        assert!(Uid::parse("1.02").is_err());
        assert!(Uid::parse("1.2.a").is_err());
        assert!(Uid::parse(&"1.".repeat(40)).is_err());
    }

    #[test]
    fn study_resolution_rejects_conflicts() {
        let hierarchy = IdentifierHierarchy::default();
        let a = Uid::parse("1.2.3").unwrap();
        let b = Uid::parse("1.2.4").unwrap();

        assert_eq!(hierarchy.resolve_study(&[Some(&a), None, Some(&a)]), Ok(a.clone()));
        assert!(matches!(
            hierarchy.resolve_study(&[Some(&a), Some(&b), None]),
            Err(IdentifierError::StudyConflict { .. })
        ));
        assert!(hierarchy.resolve_study(&[None, None, None]).is_ok());
    }
}
