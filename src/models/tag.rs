use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::traits::{CollectionName, RequiredFields, UniqueFields};
use crate::db::{Db, Document, Filter};
use crate::error::{ApiError, ApiResult};
use crate::models::RecordId;

/// A label that can be attached to participants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    #[serde(rename = "_id")]
    pub id: RecordId,
    /// The name of the tag, which must be unique
    pub tag_name: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl CollectionName for Tag {
    fn collection_name() -> &'static str {
        "Tag"
    }
}

impl UniqueFields for Tag {
    fn unique_fields() -> &'static [&'static str] {
        &["tagName"]
    }
}

impl RequiredFields for Tag {
    fn required_fields() -> &'static [&'static str] {
        &["tagName"]
    }
}

impl Document for Tag {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTag {
    pub tag_name: String,
}

impl From<NewTag> for Tag {
    fn from(new_tag: NewTag) -> Self {
        Tag {
            id: RecordId::new(),
            tag_name: new_tag.tag_name,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Tag {
    pub async fn with_id(id: RecordId, db: &Db) -> ApiResult<Self> {
        Self::with_id_opt(id, db)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Tag {}", id)))
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

    pub async fn all(db: &Db) -> ApiResult<Vec<Self>> {
        db.collection::<Self>()
            .find(&Filter::All)
            .await
            .map_err(Into::into)
    }

    pub async fn with_names(names: &[String], db: &Db) -> ApiResult<Vec<Self>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let names = names.iter().cloned().map(Into::into).collect();
        db.collection::<Self>()
            .find(&Filter::In("tagName", names))
            .await
            .map_err(Into::into)
    }

    pub async fn update(id: RecordId, update: &NewTag, db: &Db) -> ApiResult<bool> {
        db.collection::<Self>()
            .update(id, update)
            .await
            .map_err(Into::into)
    }
}
