use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::traits::{CollectionName, RequiredFields, UniqueFields};
use crate::db::{Db, Document, Filter};
use crate::error::{ApiError, ApiResult};
use crate::models::participant::Participant;
use crate::models::study::Study;
use crate::models::{IdSet, RecordId};

/// A scheduled sitting of a study
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: RecordId,
    /// The study this session belongs to
    pub study_id: RecordId,
    /// The code the session is known by, which must be unique
    pub session_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// The time of day, as the researchers entered it
    pub time: String,
    pub location: String,
    /// How many participants the session has room for
    pub participant_num: u32,
    #[serde(default)]
    pub participant_list: IdSet,
    #[serde(default)]
    pub is_archive: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl CollectionName for Session {
    fn collection_name() -> &'static str {
        "Session"
    }
}

impl UniqueFields for Session {
    fn unique_fields() -> &'static [&'static str] {
        &["sessionCode"]
    }
}

impl RequiredFields for Session {
    fn required_fields() -> &'static [&'static str] {
        &["sessionCode", "time", "location"]
    }
}

impl Document for Session {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub session_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub time: String,
    pub location: String,
    pub participant_num: u32,
    #[serde(default)]
    pub participant_list: IdSet,
    #[serde(default)]
    pub is_archive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_code: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub date: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_num: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_list: Option<IdSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_archive: Option<bool>,
}

/// The contact details of a participant booked into a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParticipant {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_num: String,
}

impl From<&Participant> for SessionParticipant {
    fn from(participant: &Participant) -> Self {
        Self {
            id: participant.id,
            first_name: participant.first_name.clone(),
            last_name: participant.last_name.clone(),
            email: participant.email.clone(),
            phone_num: participant.phone_num.clone(),
        }
    }
}

/// A session with its participant list filled in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub study_id: RecordId,
    pub session_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub time: String,
    pub location: String,
    pub participant_num: u32,
    pub participant_list: Vec<SessionParticipant>,
    pub is_archive: bool,
}

impl Session {
    pub async fn create(study_id: RecordId, new_session: NewSession, db: &Db) -> ApiResult<Self> {
        Study::with_id(study_id, db).await?;

        let session = Session {
            id: RecordId::new(),
            study_id,
            session_code: new_session.session_code,
            date: new_session.date,
            time: new_session.time,
            location: new_session.location,
            participant_num: new_session.participant_num,
            participant_list: new_session.participant_list,
            is_archive: new_session.is_archive,
            created_at: None,
            updated_at: None,
        };

        db.collection::<Self>()
            .create(&session)
            .await
            .map_err(Into::into)
    }

    pub async fn with_id(id: RecordId, db: &Db) -> ApiResult<Self> {
        db.collection::<Self>()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Session {}", id)))
    }

    pub async fn for_study(study_id: RecordId, db: &Db) -> ApiResult<Vec<SessionView>> {
        let sessions = db
            .collection::<Self>()
            .find(&Filter::eq("studyId", study_id))
            .await?;

        let mut views = Vec::with_capacity(sessions.len());
        for session in sessions {
            let participant_list = session
                .participants(db)
                .await?
                .iter()
                .map(SessionParticipant::from)
                .collect();
            views.push(SessionView {
                id: session.id,
                study_id: session.study_id,
                session_code: session.session_code,
                date: session.date,
                time: session.time,
                location: session.location,
                participant_num: session.participant_num,
                participant_list,
                is_archive: session.is_archive,
            });
        }

        Ok(views)
    }

    /// The session's participants in list order, dropping any that were deleted.
    pub async fn participants(&self, db: &Db) -> ApiResult<Vec<Participant>> {
        let mut found = Participant::with_ids(self.participant_list.as_slice(), db).await?;
        if found.len() < self.participant_list.len() {
            tracing::warn!(
                session = %self.id,
                missing = self.participant_list.len() - found.len(),
                "session lists participants that no longer exist"
            );
        }

        let mut ordered = Vec::with_capacity(found.len());
        for id in &self.participant_list {
            if let Some(index) = found.iter().position(|participant| participant.id == *id) {
                ordered.push(found.swap_remove(index));
            }
        }

        Ok(ordered)
    }

    pub async fn update(id: RecordId, update: &SessionUpdate, db: &Db) -> ApiResult<bool> {
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
}
