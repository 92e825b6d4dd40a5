use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::traits::{CollectionName, RequiredFields, UniqueFields};
use crate::db::{Db, Document, Filter, Update};
use crate::error::{ApiError, ApiResult};
use crate::models::researcher::{Researcher, ResearcherProfile};
use crate::models::study_participant::StudyParticipant;
use crate::models::{IdSet, RecordId};

/// How often a serial reservation is retried after losing a race.
const SERIAL_RESERVATION_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    #[serde(rename = "_id")]
    pub id: RecordId,
    /// The short code the study is known by, which must be unique
    pub study_code: String,
    #[serde(default)]
    pub study_name: String,
    #[serde(default)]
    pub description: String,
    /// The researcher who created the study
    pub creator: RecordId,
    /// Everyone working on the study, creator included
    #[serde(default)]
    pub researcher_list: IdSet,
    #[serde(default)]
    pub study_type: String,
    /// How many participants the study is recruiting
    #[serde(default)]
    pub participant_num: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub recruitment_start_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub recruitment_close_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub location: Vec<String>,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default)]
    pub survey_link: String,
    #[serde(default)]
    pub drive_link: String,
    /// The highest serial number ever handed out to an enrolment, which
    /// only grows
    #[serde(default)]
    pub last_serial_num: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl CollectionName for Study {
    fn collection_name() -> &'static str {
        "Study"
    }
}

impl UniqueFields for Study {
    fn unique_fields() -> &'static [&'static str] {
        &["studyCode"]
    }
}

impl RequiredFields for Study {
    fn required_fields() -> &'static [&'static str] {
        &["studyCode"]
    }
}

impl Document for Study {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudy {
    pub study_code: String,
    #[serde(default)]
    pub study_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub study_type: String,
    #[serde(default)]
    pub participant_num: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub recruitment_start_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub recruitment_close_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub location: Vec<String>,
    #[serde(default)]
    pub survey_link: String,
    #[serde(default)]
    pub drive_link: String,
}

impl NewStudy {
    pub fn into_study(self, creator: RecordId) -> Study {
        Study {
            id: RecordId::new(),
            study_code: self.study_code,
            study_name: self.study_name,
            description: self.description,
            creator,
            researcher_list: [creator].into_iter().collect(),
            study_type: self.study_type,
            participant_num: self.participant_num,
            recruitment_start_date: self.recruitment_start_date,
            recruitment_close_date: self.recruitment_close_date,
            location: self.location,
            is_closed: false,
            survey_link: self.survey_link,
            drive_link: self.drive_link,
            last_serial_num: 0,
            created_at: None,
            updated_at: None,
        }
    }
}

/// The editable details of a study.
///
/// Only the fields present in the request are changed. The creator and the
/// researcher list are managed by association and cannot be set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_num: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub recruitment_start_date: Option<OffsetDateTime>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub recruitment_close_date: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_closed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survey_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_link: Option<String>,
}

/// A study as shown on a researcher's dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyReport {
    pub study_id: RecordId,
    pub study_code: String,
    pub study_name: String,
    pub participant_num: u32,
    /// How many participants are actively enrolled right now
    pub participant_current_num: u64,
    /// Whether the study is closed
    pub status: bool,
    pub description: String,
    pub creator: Option<ResearcherProfile>,
    pub researcher_list: Vec<ResearcherProfile>,
    pub study_type: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub recruitment_start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub recruitment_close_date: Option<OffsetDateTime>,
    pub location: Vec<String>,
    pub survey_link: String,
    pub drive_link: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl StudyReport {
    pub async fn for_study(study: Study, db: &Db) -> ApiResult<Self> {
        let researcher_list = study.researchers(db).await?;
        let creator = researcher_list
            .iter()
            .find(|researcher| researcher.id == study.creator)
            .cloned();
        let creator = match creator {
            Some(creator) => Some(creator),
            None => Researcher::with_id_opt(study.creator, db)
                .await?
                .as_ref()
                .map(ResearcherProfile::from),
        };
        let participant_current_num = StudyParticipant::count_active(study.id, db).await?;

        Ok(Self {
            study_id: study.id,
            study_code: study.study_code,
            study_name: study.study_name,
            participant_num: study.participant_num,
            participant_current_num,
            status: study.is_closed,
            description: study.description,
            creator,
            researcher_list,
            study_type: study.study_type,
            recruitment_start_date: study.recruitment_start_date,
            recruitment_close_date: study.recruitment_close_date,
            location: study.location,
            survey_link: study.survey_link,
            drive_link: study.drive_link,
            created_at: study.created_at,
            updated_at: study.updated_at,
        })
    }

    /// Reports on every study in the researcher's study list, in list order.
    ///
    /// Ids in the list whose study has since been deleted are skipped.
    pub async fn for_researcher(researcher_id: RecordId, db: &Db) -> ApiResult<Vec<Self>> {
        let researcher = Researcher::with_id(researcher_id, db).await?;
        let mut reports = Vec::with_capacity(researcher.study_list.len());

        for study_id in &researcher.study_list {
            match Study::with_id_opt(*study_id, db).await? {
                Some(study) => reports.push(Self::for_study(study, db).await?),
                None => tracing::warn!(
                    researcher = %researcher_id,
                    study = %study_id,
                    "researcher's study list refers to a missing study"
                ),
            }
        }

        Ok(reports)
    }
}

impl Study {
    pub async fn with_id(id: RecordId, db: &Db) -> ApiResult<Self> {
        Self::with_id_opt(id, db)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Study {}", id)))
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

    pub async fn update(id: RecordId, update: &StudyUpdate, db: &Db) -> ApiResult<bool> {
        db.collection::<Self>()
            .update(id, update)
            .await
            .map_err(Into::into)
    }

    /// Reserves the next `count` serial numbers for enrolments in the study,
    /// returning the serial handed out just before them.
    ///
    /// The mark is only advanced if nobody else moved it since it was read,
    /// so concurrent enrolments never share a number.
    pub async fn reserve_serials(id: RecordId, count: u64, db: &Db) -> ApiResult<u64> {
        for _ in 0..SERIAL_RESERVATION_ATTEMPTS {
            let study = Self::with_id(id, db).await?;
            let last = study
                .last_serial_num
                .max(StudyParticipant::max_serial(id, db).await?);
            if count == 0 {
                return Ok(last);
            }

            let unchanged =
                Filter::id(id).and(Filter::eq("lastSerialNum", study.last_serial_num));
            let advanced = db
                .collection::<Self>()
                .update_many(&unchanged, &Update::set("lastSerialNum", last + count))
                .await?;
            if advanced > 0 {
                return Ok(last);
            }
        }

        Err(ApiError::ServerError(format!(
            "Could not reserve serial numbers for study {}",
            id
        )))
    }

    /// The researchers on this study, skipping any that no longer exist.
    pub async fn researchers(&self, db: &Db) -> ApiResult<Vec<ResearcherProfile>> {
        let researchers = Researcher::with_ids(self.researcher_list.as_slice(), db).await?;

        Ok(self
            .researcher_list
            .iter()
            .filter_map(|id| researchers.iter().find(|researcher| researcher.id == *id))
            .map(ResearcherProfile::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mock::{mock_new_study, mock_researcher};

    #[tokio::test]
    async fn update_only_touches_given_fields() {
        let db = Db::in_memory();
        let creator = mock_researcher("ada", &db).await;
        let study = db
            .collection::<Study>()
            .create(&mock_new_study("S-1").into_study(creator.id))
            .await
            .unwrap();

        let update = StudyUpdate {
            is_closed: Some(true),
            ..StudyUpdate::default()
        };
        assert!(Study::update(study.id, &update, &db).await.unwrap());

        let updated = Study::with_id(study.id, &db).await.unwrap();
        assert!(updated.is_closed);
        assert_eq!(updated.study_name, study.study_name);
        assert_eq!(updated.creator, creator.id);
    }

    #[tokio::test]
    async fn update_of_missing_study_reports_no_match() {
        let db = Db::in_memory();
        let updated = Study::update(RecordId::new(), &StudyUpdate::default(), &db)
            .await
            .unwrap();

        assert!(!updated);
    }

    #[tokio::test]
    async fn serial_reservations_never_hand_out_a_number_twice() {
        let db = Db::in_memory();
        let creator = mock_researcher("ada", &db).await;
        let study = db
            .collection::<Study>()
            .create(&mock_new_study("S-1").into_study(creator.id))
            .await
            .unwrap();

        assert_eq!(Study::reserve_serials(study.id, 2, &db).await.unwrap(), 0);
        assert_eq!(Study::reserve_serials(study.id, 0, &db).await.unwrap(), 2);
        assert_eq!(Study::reserve_serials(study.id, 3, &db).await.unwrap(), 2);
        assert_eq!(Study::with_id(study.id, &db).await.unwrap().last_serial_num, 5);
    }

    #[tokio::test]
    async fn researchers_skip_missing_records() {
        let db = Db::in_memory();
        let creator = mock_researcher("ada", &db).await;
        let mut new_study = mock_new_study("S-1").into_study(creator.id);
        new_study.researcher_list.insert(RecordId::new());
        let study = db.collection::<Study>().create(&new_study).await.unwrap();

        let researchers = study.researchers(&db).await.unwrap();

        assert_eq!(researchers.len(), 1);
        assert_eq!(researchers[0].id, creator.id);
    }
}
