use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::auth::{hash_password, verify_password};
use crate::db::traits::{CollectionName, RequiredFields, UniqueFields};
use crate::db::{Db, Document, Filter};
use crate::error::{ApiError, ApiResult};
use crate::models::{IdSet, RecordId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Researcher {
    #[serde(rename = "_id")]
    pub id: RecordId,
    /// The researcher's first name
    #[serde(default)]
    pub first_name: String,
    /// The researcher's last name
    #[serde(default)]
    pub last_name: String,
    /// The researcher's email, which must be unique
    pub email: String,
    /// The name they log in with, which must be unique
    pub username: String,
    /// A bcrypt hash of their password
    pub pass_hash: String,
    /// The studies the researcher works on, in the order they joined them
    #[serde(default)]
    pub study_list: IdSet,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

fn active_by_default() -> bool {
    true
}

impl CollectionName for Researcher {
    fn collection_name() -> &'static str {
        "Researcher"
    }
}

impl UniqueFields for Researcher {
    fn unique_fields() -> &'static [&'static str] {
        &["email", "username"]
    }
}

impl RequiredFields for Researcher {
    fn required_fields() -> &'static [&'static str] {
        &["email", "username"]
    }
}

impl Document for Researcher {
    fn id(&self) -> RecordId {
        self.id
    }
}

/// The public view of a researcher; never includes the password hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearcherProfile {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub study_list: IdSet,
    pub is_active: bool,
}

impl From<&Researcher> for ResearcherProfile {
    fn from(researcher: &Researcher) -> Self {
        Self {
            id: researcher.id,
            first_name: researcher.first_name.clone(),
            last_name: researcher.last_name.clone(),
            email: researcher.email.clone(),
            username: researcher.username.clone(),
            study_list: researcher.study_list.clone(),
            is_active: researcher.is_active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResearcher {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearcherUpdate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordUpdate<'p> {
    pass_hash: &'p str,
}

impl Researcher {
    pub async fn with_id(id: RecordId, db: &Db) -> ApiResult<Self> {
        Self::with_id_opt(id, db)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Researcher {}", id)))
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

    pub async fn with_email_opt(email: &str, db: &Db) -> ApiResult<Option<Self>> {
        db.collection::<Self>()
            .find_one(&Filter::eq("email", email))
            .await
            .map_err(Into::into)
    }

    pub async fn with_username_opt(username: &str, db: &Db) -> ApiResult<Option<Self>> {
        db.collection::<Self>()
            .find_one(&Filter::eq("username", username))
            .await
            .map_err(Into::into)
    }

    pub async fn all(db: &Db) -> ApiResult<Vec<Self>> {
        db.collection::<Self>()
            .find(&Filter::All)
            .await
            .map_err(Into::into)
    }

    /// Researchers whose names contain the given text, ignoring case.
    pub async fn search(
        first_name: Option<&str>,
        last_name: Option<&str>,
        db: &Db,
    ) -> ApiResult<Vec<Self>> {
        let mut filter = Filter::All;
        if let Some(first_name) = first_name {
            filter = filter.and(Filter::containing_text("firstName", first_name)?);
        }
        if let Some(last_name) = last_name {
            filter = filter.and(Filter::containing_text("lastName", last_name)?);
        }

        db.collection::<Self>()
            .find(&filter)
            .await
            .map_err(Into::into)
    }

    pub async fn register(new_researcher: NewResearcher, db: &Db) -> ApiResult<Self> {
        if Self::with_email_opt(&new_researcher.email, db)
            .await?
            .is_some()
        {
            return Err(ApiError::Conflict {
                field: "email".to_owned(),
                value: new_researcher.email,
            });
        }
        if Self::with_username_opt(&new_researcher.username, db)
            .await?
            .is_some()
        {
            return Err(ApiError::Conflict {
                field: "username".to_owned(),
                value: new_researcher.username,
            });
        }

        let researcher = Researcher {
            id: RecordId::new(),
            first_name: new_researcher.first_name,
            last_name: new_researcher.last_name,
            email: new_researcher.email,
            username: new_researcher.username,
            pass_hash: hash_password(&new_researcher.password).await?,
            study_list: IdSet::new(),
            is_active: true,
            created_at: None,
            updated_at: None,
        };

        db.collection::<Self>()
            .create(&researcher)
            .await
            .map_err(Into::into)
    }

    /// The researcher with these credentials, if they are correct.
    pub async fn check_login(username: &str, password: &str, db: &Db) -> ApiResult<Option<Self>> {
        let Some(researcher) = Self::with_username_opt(username, db).await? else {
            return Ok(None);
        };

        if verify_password(password, &researcher.pass_hash).await? {
            Ok(Some(researcher))
        } else {
            Ok(None)
        }
    }

    pub async fn update_info(id: RecordId, update: &ResearcherUpdate, db: &Db) -> ApiResult<bool> {
        db.collection::<Self>()
            .update(id, update)
            .await
            .map_err(Into::into)
    }

    /// Replaces the researcher's password after checking their current one.
    pub async fn reset_password(
        id: RecordId,
        current_password: &str,
        new_password: &str,
        db: &Db,
    ) -> ApiResult<()> {
        let researcher = Self::with_id(id, db).await?;
        if !verify_password(current_password, &researcher.pass_hash).await? {
            return Err(ApiError::Unauthorized("Current password error".to_owned()));
        }

        let pass_hash = hash_password(new_password).await?;
        let updated = db
            .collection::<Self>()
            .update(id, &PasswordUpdate {
                pass_hash: &pass_hash,
            })
            .await?;

        if updated {
            Ok(())
        } else {
            Err(ApiError::not_found(format!("Researcher {}", id)))
        }
    }
}
