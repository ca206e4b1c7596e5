//
// study.rs
// Ceph-Tools-rs
//
// Assembles a lateral/frontal cephalogram pair and its fiducial set into one cross-referenced study set.
//
// Thales Matheus Mendonça Santos - November 2025

use tracing::info;

use crate::cephalogram::CephalogramImage;
use crate::error::{Result, ValidationError};
use crate::fiducial::{FiducialSet, ReferenceCount};
use crate::uid::{IdentifierHierarchy, Uid};

/// Set-level choices that are not carried by the members themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssemblyPolicy {
    /// One Series UID for all three objects instead of one per object.
    pub shared_series: bool,
    /// Number of images the fiducial set must declare it calibrates.
    pub fiducial_reference_count: ReferenceCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyState {
    Assembled,
    Written,
}

/// Two complementary cephalograms and one fiducial set sharing a Study UID.
///
/// Members are read-only once assembled.
#[derive(Debug, Clone)]
pub struct StudySet {
    study_uid: Uid,
    image_a: CephalogramImage,
    image_b: CephalogramImage,
    fiducials: FiducialSet,
    state: StudyState,
}

impl StudySet {
    pub fn study_uid(&self) -> &Uid {
        &self.study_uid
    }

    /// Images in assembly order; the first is the one a single-reference fiducial set calibrates.
    pub fn images(&self) -> [&CephalogramImage; 2] {
        [&self.image_a, &self.image_b]
    }

    pub fn lateral(&self) -> &CephalogramImage {
        if self.image_a.view().is_lateral() {
            &self.image_a
        } else {
            &self.image_b
        }
    }

    pub fn frontal(&self) -> &CephalogramImage {
        if self.image_a.view().is_lateral() {
            &self.image_b
        } else {
            &self.image_a
        }
    }

    pub fn fiducials(&self) -> &FiducialSet {
        &self.fiducials
    }

    pub fn state(&self) -> StudyState {
        self.state
    }

    pub(crate) fn into_written(mut self) -> Self {
        self.state = StudyState::Written;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct StudySetAssembler {
    identifiers: IdentifierHierarchy,
    policy: AssemblyPolicy,
}

impl StudySetAssembler {
    pub fn new(policy: AssemblyPolicy) -> Self {
        Self {
            identifiers: IdentifierHierarchy::default(),
            policy,
        }
    }

    pub fn with_identifiers(mut self, identifiers: IdentifierHierarchy) -> Self {
        self.identifiers = identifiers;
        self
    }

    pub fn policy(&self) -> AssemblyPolicy {
        self.policy
    }

    /// Validates the members, threads identifiers through them and freezes the result.
    ///
    /// Nothing is touched on disk. Any failure discards the whole set.
    pub fn assemble(
        &self,
        mut image_a: CephalogramImage,
        mut image_b: CephalogramImage,
        mut fiducials: FiducialSet,
    ) -> Result<StudySet> {
        if image_a.view().is_lateral() == image_b.view().is_lateral() {
            return Err(ValidationError::Orientation {
                first: image_a.view(),
                second: image_b.view(),
            }
            .into());
        }

        let declared = fiducials.reference_count().count();
        let expected = self.policy.fiducial_reference_count.count();
        if declared != expected {
            return Err(ValidationError::ReferenceCount { declared, expected }.into());
        }

        let study_uid = self.identifiers.assign_to_study_set(
            &mut image_a,
            &mut image_b,
            &mut fiducials,
            self.policy.shared_series,
        )?;

        // the fiducial object belongs to the same patient and study as the images
        fiducials.patient = image_a.patient.clone();
        fiducials.study = image_a.study.clone();

        info!(
            study = %study_uid,
            first = %image_a.view(),
            second = %image_b.view(),
            "assembled cephalogram set"
        );
        Ok(StudySet {
            study_uid,
            image_a,
            image_b,
            fiducials,
            state: StudyState::Assembled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cephalogram::tests::sample_image;
    use crate::cephalogram::ViewPosition;
    use crate::error::{CephError, IdentifierError};
    use crate::codes::{FIDUCIAL_MARK, OTHER_IMAGE_OF_BIPLANE_PAIR};
    use crate::fiducial::tests::sample_fiducials;
    use dicom::dictionary_std::uids;
    use std::collections::HashSet;

    fn assemble(policy: AssemblyPolicy) -> Result<StudySet> {
        StudySetAssembler::new(policy).assemble(
            sample_image(ViewPosition::LeftLateral),
            sample_image(ViewPosition::PosteroAnterior),
            sample_fiducials(),
        )
    }

    #[test]
    fn members_share_one_study_and_distinct_sops() {
        let set = assemble(AssemblyPolicy::default()).expect("assemble");
        let [a, b] = set.images();
        let f = set.fiducials();

        for identity in [a.identity(), b.identity(), f.identity()] {
            assert_eq!(identity.study.as_ref(), Some(set.study_uid()));
        }
        let sops: HashSet<_> = [a.identity(), b.identity(), f.identity()]
            .iter()
            .map(|i| i.sop.clone().expect("sop"))
            .collect();
        assert_eq!(sops.len(), 3);

        let series: HashSet<_> = [a.identity(), b.identity(), f.identity()]
            .iter()
            .map(|i| i.series.clone().expect("series"))
            .collect();
        assert_eq!(series.len(), 3);
        assert_eq!(set.state(), StudyState::Assembled);
    }

    #[test]
    fn cross_references_are_wired() {
        let set = assemble(AssemblyPolicy::default()).unwrap();
        let [a, b] = set.images();
        let f = set.fiducials();

        let other = a.other_image().expect("other image");
        assert_eq!(Some(&other.sop_instance_uid), b.identity().sop.as_ref());
        assert_eq!(other.purpose, Some(OTHER_IMAGE_OF_BIPLANE_PAIR));

        let fid = b.fiducial_reference().expect("fiducial reference");
        assert_eq!(Some(&fid.sop_instance_uid), f.identity().sop.as_ref());
        assert_eq!(fid.sop_class_uid, uids::SPATIAL_FIDUCIALS_STORAGE);
        assert_eq!(fid.purpose, Some(FIDUCIAL_MARK));

        let referenced: Vec<_> = f.referenced_images().iter().collect();
        assert_eq!(referenced, [a.identity().sop.as_ref().unwrap(), b.identity().sop.as_ref().unwrap()]);
        assert_eq!(f.patient.id.as_deref(), Some("B1893"));
        assert_eq!(set.lateral().view(), ViewPosition::LeftLateral);
        assert_eq!(set.frontal().view(), ViewPosition::PosteroAnterior);
    }

    #[test]
    fn shared_series_policy() {
        let set = assemble(AssemblyPolicy {
            shared_series: true,
            ..Default::default()
        })
        .unwrap();
        let [a, b] = set.images();
        assert_eq!(a.identity().series, b.identity().series);
        assert_eq!(a.identity().series, set.fiducials().identity().series);
    }

    #[test]
    fn single_reference_calibrates_first_image() {
        let set = StudySetAssembler::new(AssemblyPolicy {
            shared_series: false,
            fiducial_reference_count: ReferenceCount::One,
        })
        .assemble(
            sample_image(ViewPosition::PosteroAnterior),
            sample_image(ViewPosition::RightLateral),
            sample_fiducials().with_reference_count(ReferenceCount::One),
        )
        .unwrap();
        let [a, _] = set.images();
        assert_eq!(set.fiducials().referenced_images(), [a.identity().sop.clone().unwrap()]);
    }

    #[test]
    fn two_laterals_are_rejected() {
        let err = StudySetAssembler::default()
            .assemble(
                sample_image(ViewPosition::LeftLateral),
                sample_image(ViewPosition::RightLateral),
                sample_fiducials(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CephError::Validation(ValidationError::Orientation { .. })
        ));
    }

    #[test]
    fn declared_reference_count_must_match_policy() {
        let err = StudySetAssembler::default()
            .assemble(
                sample_image(ViewPosition::LeftLateral),
                sample_image(ViewPosition::AnteroPosterior),
                sample_fiducials().with_reference_count(ReferenceCount::One),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CephError::Validation(ValidationError::ReferenceCount {
                declared: 1,
                expected: 2
            })
        ));
    }

    #[test]
    fn existing_study_uid_is_reused_and_conflicts_fail() {
        let study = Uid::parse("1.2.826.0.1.3680043.9.7").unwrap();
        let set = StudySetAssembler::default()
            .assemble(
                sample_image(ViewPosition::LeftLateral).with_study_uid(study.clone()),
                sample_image(ViewPosition::PosteroAnterior),
                sample_fiducials(),
            )
            .unwrap();
        assert_eq!(set.study_uid(), &study);

        let err = StudySetAssembler::default()
            .assemble(
                sample_image(ViewPosition::LeftLateral).with_study_uid(study),
                sample_image(ViewPosition::PosteroAnterior)
                    .with_study_uid(Uid::parse("1.2.3").unwrap()),
                sample_fiducials(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CephError::Identifier(IdentifierError::StudyConflict { .. })
        ));
    }

    #[test]
    fn preassigned_sop_uid_survives() {
        let sop = Uid::parse("1.2.826.0.1.3680043.9.7.1").unwrap();
        let set = StudySetAssembler::default()
            .assemble(
                sample_image(ViewPosition::LeftLateral).with_sop_uid(sop.clone()),
                sample_image(ViewPosition::PosteroAnterior),
                sample_fiducials(),
            )
            .unwrap();
        assert_eq!(set.lateral().identity().sop.as_ref(), Some(&sop));
    }

    #[test]
    fn duplicate_sop_uids_are_rejected() {
        let sop = Uid::parse("1.2.826.0.1.3680043.9.7.2").unwrap();
        let err = StudySetAssembler::default()
            .assemble(
                sample_image(ViewPosition::LeftLateral).with_sop_uid(sop.clone()),
                sample_image(ViewPosition::PosteroAnterior).with_sop_uid(sop.clone()),
                sample_fiducials(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CephError::Identifier(IdentifierError::SopConflict(ref uid)) if uid == sop.as_str()
        ));
    }
}
