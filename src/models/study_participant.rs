use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::traits::{CollectionName, RequiredFields, UniqueFields};
use crate::db::{Db, Document, Filter};
use crate::error::{ApiError, ApiResult};
use crate::models::participant::Participant;
use crate::models::tag::Tag;
use crate::models::{id_values, RecordId};

/// One enrolment of a participant in a study.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyParticipant {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub study_id: RecordId,
    pub participant_id: RecordId,
    /// The participant's number within the study, starting at 1
    pub serial_num: u64,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub is_gift: bool,
    #[serde(default)]
    pub is_sent_gift: bool,
    #[serde(default)]
    pub is_will_receive_report: bool,
    #[serde(default)]
    pub is_sent_report: bool,
    #[serde(default)]
    pub note: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

fn active_by_default() -> bool {
    true
}

impl CollectionName for StudyParticipant {
    fn collection_name() -> &'static str {
        "StudyParticipant"
    }
}

impl UniqueFields for StudyParticipant {}

impl RequiredFields for StudyParticipant {}

impl Document for StudyParticipant {
    fn id(&self) -> RecordId {
        self.id
    }
}

impl StudyParticipant {
    pub fn new(study_id: RecordId, participant_id: RecordId, serial_num: u64) -> Self {
        Self {
            id: RecordId::new(),
            study_id,
            participant_id,
            serial_num,
            is_active: true,
            is_complete: false,
            is_gift: false,
            is_sent_gift: false,
            is_will_receive_report: false,
            is_sent_report: false,
            note: String::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyParticipantUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_gift: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_sent_gift: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_will_receive_report: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_sent_report: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The participant details shown next to an enrolment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_num: String,
    pub is_will_contact: bool,
    /// Ids of the participant's tags that still exist
    pub tag: Vec<RecordId>,
    /// Names of those tags, in the same order
    pub tags_info: Vec<String>,
}

/// An enrolment with its participant filled in.
///
/// `participant_info` is `None` when the participant has been deleted since
/// enrolling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyParticipantView {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub study_id: RecordId,
    pub participant_id: RecordId,
    pub serial_num: u64,
    pub is_active: bool,
    pub is_complete: bool,
    pub is_gift: bool,
    pub is_sent_gift: bool,
    pub is_will_receive_report: bool,
    pub is_sent_report: bool,
    pub note: String,
    pub participant_info: Option<ParticipantInfo>,
}

impl StudyParticipant {
    pub async fn with_id(id: RecordId, db: &Db) -> ApiResult<Self> {
        Self::with_id_opt(id, db)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("StudyParticipant {}", id)))
    }

    pub async fn with_id_opt(id: RecordId, db: &Db) -> ApiResult<Option<Self>> {
        db.collection::<Self>()
            .get_by_id(id)
            .await
            .map_err(Into::into)
    }

    pub async fn with_ids(ids: &[RecordId], db: &Db) -> ApiResult<Vec<Self>> {
        db.collection::<Self>()
            .find_by_ids(ids)
            .await
            .map_err(Into::into)
    }

    pub async fn count_active(study_id: RecordId, db: &Db) -> ApiResult<u64> {
        db.collection::<Self>()
            .count(&Filter::eq("studyId", study_id).and(Filter::eq("isActive", true)))
            .await
            .map_err(Into::into)
    }

    /// The highest serial number handed out in the study so far, or 0.
    pub async fn max_serial(study_id: RecordId, db: &Db) -> ApiResult<u64> {
        let rows = db
            .collection::<Self>()
            .find(&Filter::eq("studyId", study_id))
            .await?;

        Ok(rows.iter().map(|row| row.serial_num).max().unwrap_or(0))
    }

    /// Existing enrolments in the study for any of the given participants.
    pub async fn enrolled_in(
        study_id: RecordId,
        participant_ids: &[RecordId],
        db: &Db,
    ) -> ApiResult<Vec<Self>> {
        if participant_ids.is_empty() {
            return Ok(Vec::new());
        }

        let filter = Filter::eq("studyId", study_id)
            .and(Filter::In("participantId", id_values(participant_ids)));
        db.collection::<Self>()
            .find(&filter)
            .await
            .map_err(Into::into)
    }

    pub async fn for_participant(participant_id: RecordId, db: &Db) -> ApiResult<Vec<Self>> {
        db.collection::<Self>()
            .find(&Filter::eq("participantId", participant_id))
            .await
            .map_err(Into::into)
    }

    pub async fn active_for_study(study_id: RecordId, db: &Db) -> ApiResult<Vec<Self>> {
        db.collection::<Self>()
            .find(&Filter::eq("studyId", study_id).and(Filter::eq("isActive", true)))
            .await
            .map_err(Into::into)
    }

    pub async fn update(id: RecordId, update: &StudyParticipantUpdate, db: &Db) -> ApiResult<bool> {
        db.collection::<Self>()
            .update(id, update)
            .await
            .map_err(Into::into)
    }

    pub async fn delete(id: RecordId, db: &Db) -> ApiResult<bool> {
        db.collection::<Self>()
            .delete(id)
            .await
            .map_err(Into::into)
    }

    /// The active enrolments of a study, with participants and tags filled in.
    pub async fn populated_for_study(
        study_id: RecordId,
        db: &Db,
    ) -> ApiResult<Vec<StudyParticipantView>> {
        let rows = Self::active_for_study(study_id, db).await?;
        Self::populate(rows, db).await
    }

    pub async fn populated_with_ids(
        ids: &[RecordId],
        db: &Db,
    ) -> ApiResult<Vec<StudyParticipantView>> {
        let rows = Self::with_ids(ids, db).await?;
        Self::populate(rows, db).await
    }

    /// Expands each row's participant, then each participant's tags.
    ///
    /// Participants and tags that no longer exist are left out rather than
    /// treated as errors.
    pub async fn populate(rows: Vec<Self>, db: &Db) -> ApiResult<Vec<StudyParticipantView>> {
        let participant_ids: Vec<RecordId> = rows.iter().map(|row| row.participant_id).collect();
        let participants: HashMap<RecordId, Participant> =
            Participant::with_ids(&participant_ids, db)
                .await?
                .into_iter()
                .map(|participant| (participant.id, participant))
                .collect();

        let mut tag_ids: Vec<RecordId> = participants
            .values()
            .flat_map(|participant| participant.tag.iter().copied())
            .collect();
        tag_ids.sort();
        tag_ids.dedup();
        let tags: HashMap<RecordId, String> = Tag::with_ids(&tag_ids, db)
            .await?
            .into_iter()
            .map(|tag| (tag.id, tag.tag_name))
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let participant_info = match participants.get(&row.participant_id) {
                    Some(participant) => Some(participant_info(participant, &tags)),
                    None => {
                        tracing::warn!(
                            study_participant = %row.id,
                            participant = %row.participant_id,
                            "enrolment refers to a missing participant"
                        );
                        None
                    }
                };

                row.into_view(participant_info)
            })
            .collect())
    }

    fn into_view(self, participant_info: Option<ParticipantInfo>) -> StudyParticipantView {
        StudyParticipantView {
            id: self.id,
            study_id: self.study_id,
            participant_id: self.participant_id,
            serial_num: self.serial_num,
            is_active: self.is_active,
            is_complete: self.is_complete,
            is_gift: self.is_gift,
            is_sent_gift: self.is_sent_gift,
            is_will_receive_report: self.is_will_receive_report,
            is_sent_report: self.is_sent_report,
            note: self.note,
            participant_info,
        }
    }
}

fn participant_info(participant: &Participant, tags: &HashMap<RecordId, String>) -> ParticipantInfo {
    let (tag, tags_info): (Vec<RecordId>, Vec<String>) = participant
        .tag
        .iter()
        .filter_map(|id| tags.get(id).map(|name| (*id, name.clone())))
        .unzip();

    ParticipantInfo {
        id: participant.id,
        first_name: participant.first_name.clone(),
        last_name: participant.last_name.clone(),
        email: participant.email.clone(),
        phone_num: participant.phone_num.clone(),
        is_will_contact: participant.is_will_contact,
        tag,
        tags_info,
    }
}
