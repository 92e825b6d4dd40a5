use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::traits::{CollectionName, RequiredFields, UniqueFields};
use crate::db::{Db, Document, Filter};
use crate::error::{ApiError, ApiResult};
use crate::models::{IdSet, RecordId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(rename = "_id")]
    pub id: RecordId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// The participant's email, which must be unique
    pub email: String,
    #[serde(default)]
    pub phone_num: String,
    /// The tags attached to the participant
    #[serde(default)]
    pub tag: IdSet,
    /// Whether the participant agreed to be contacted about future studies
    #[serde(default)]
    pub is_will_contact: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl CollectionName for Participant {
    fn collection_name() -> &'static str {
        "Participant"
    }
}

impl UniqueFields for Participant {
    fn unique_fields() -> &'static [&'static str] {
        &["email"]
    }
}

impl RequiredFields for Participant {
    fn required_fields() -> &'static [&'static str] {
        &["email"]
    }
}

impl Document for Participant {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParticipant {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_num: String,
    #[serde(default)]
    pub tag: IdSet,
    #[serde(default)]
    pub is_will_contact: bool,
}

impl From<NewParticipant> for Participant {
    fn from(new_participant: NewParticipant) -> Self {
        Participant {
            id: RecordId::new(),
            first_name: new_participant.first_name,
            last_name: new_participant.last_name,
            email: new_participant.email,
            phone_num: new_participant.phone_num,
            tag: new_participant.tag,
            is_will_contact: new_participant.is_will_contact,
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_num: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<IdSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_will_contact: Option<bool>,
}

/// Just the id of a participant, as listed by `GET /participant/all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParticipantId {
    #[serde(rename = "_id")]
    pub id: RecordId,
}

impl Participant {
    pub async fn with_id(id: RecordId, db: &Db) -> ApiResult<Self> {
        Self::with_id_opt(id, db)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Participant {}", id)))
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

    pub async fn all_ids(db: &Db) -> ApiResult<Vec<ParticipantId>> {
        let participants = db.collection::<Self>().find(&Filter::All).await?;

        Ok(participants
            .into_iter()
            .map(|participant| ParticipantId { id: participant.id })
            .collect())
    }

    /// The participants already registered under any of these emails.
    pub async fn with_emails(emails: &[String], db: &Db) -> ApiResult<Vec<Self>> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let emails = emails.iter().cloned().map(Into::into).collect();
        db.collection::<Self>()
            .find(&Filter::In("email", emails))
            .await
            .map_err(Into::into)
    }

    pub async fn update(id: RecordId, update: &ParticipantUpdate, db: &Db) -> ApiResult<bool> {
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
