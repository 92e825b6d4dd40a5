//! Operations that write to more than one collection.
//!
//! The store has no transactions, so each operation here is a sequence of
//! independent writes. Where a later write can miss after an earlier one
//! landed, the result says which sides were written instead of rolling back.

pub mod association;
pub mod bulk;
pub mod cleanup;
pub mod enrollment;
pub mod toggle;

pub use self::association::{
    add_new_researcher_to_study, associate_researcher_with_study, create_study,
    remove_association, remove_researcher_from_study, AddedResearcher, AssociationOutcome,
    CreatedStudy, StudyResearcherDetails,
};
pub use self::bulk::{insert_deduplicated, DeduplicatedInsert, NaturalKey};
pub use self::cleanup::{delete_study, delete_tag};
pub use self::enrollment::{enroll_participants, participant_should_keep_info, Enrollment};
pub use self::toggle::{toggle_flag, Flag, ParticipantFlag, StudyParticipantFlag};
