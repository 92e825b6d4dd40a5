use std::collections::HashSet;

use crate::db::{BulkInsert, Db, InsertFailure};
use crate::error::ApiResult;
use crate::models::participant::Participant;
use crate::models::study::Study;
use crate::models::study_participant::StudyParticipant;
use crate::models::{IdSet, RecordId};

#[derive(Debug)]
pub struct Enrollment {
    pub created: Vec<StudyParticipant>,
    /// Participants who were already enrolled in the study
    pub skipped: Vec<RecordId>,
    pub failed: Vec<InsertFailure>,
}

/// Enrols participants in a study, numbering them in the order given.
///
/// Participants already enrolled are skipped. New rows continue numbering
/// from the study's serial mark, which never goes down, so numbers are not
/// reused after a row is deleted.
pub async fn enroll_participants(
    study_id: RecordId,
    participant_ids: &[RecordId],
    db: &Db,
) -> ApiResult<Enrollment> {
    Study::with_id(study_id, db).await?;

    let requested: IdSet = participant_ids.iter().copied().collect();
    let enrolled: HashSet<RecordId> =
        StudyParticipant::enrolled_in(study_id, requested.as_slice(), db)
            .await?
            .into_iter()
            .map(|row| row.participant_id)
            .collect();

    let (skipped, remaining): (Vec<RecordId>, Vec<RecordId>) = requested
        .iter()
        .copied()
        .partition(|participant_id| enrolled.contains(participant_id));

    let last_serial = Study::reserve_serials(study_id, remaining.len() as u64, db).await?;
    let rows = remaining
        .iter()
        .zip(1..)
        .map(|(participant_id, position)| {
            StudyParticipant::new(study_id, *participant_id, last_serial + position)
        })
        .collect();

    let BulkInsert { inserted, failed } = db
        .collection::<StudyParticipant>()
        .create_many(rows)
        .await?;

    tracing::info!(
        study = %study_id,
        created = inserted.len(),
        skipped = skipped.len(),
        failed = failed.len(),
        "enrolled participants"
    );

    Ok(Enrollment {
        created: inserted,
        skipped,
        failed,
    })
}

/// Whether a participant's contact details must be kept.
///
/// They are kept when the participant agreed to be contacted again, and
/// otherwise only while they have no active enrolment.
pub async fn participant_should_keep_info(participant_id: RecordId, db: &Db) -> ApiResult<bool> {
    let participant = Participant::with_id(participant_id, db).await?;
    if participant.is_will_contact {
        return Ok(true);
    }

    let enrolments = StudyParticipant::for_participant(participant_id, db).await?;

    Ok(!enrolments.iter().any(|row| row.is_active))
}
