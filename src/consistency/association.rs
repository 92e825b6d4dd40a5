use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Db;
use crate::error::{ApiError, ApiResult};
use crate::models::researcher::{NewResearcher, Researcher, ResearcherProfile};
use crate::models::study::{NewStudy, Study};
use crate::models::RecordId;
use crate::util::email_local_part;

const RESEARCHER_LIST: &str = "researcherList";
const STUDY_LIST: &str = "studyList";

/// Which sides of a researcher/study link were written.
///
/// The two writes are independent, so one can land without the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationOutcome {
    pub study_updated: bool,
    pub researcher_updated: bool,
}

impl AssociationOutcome {
    pub fn succeeded(&self) -> bool {
        self.study_updated && self.researcher_updated
    }
}

/// Adds the researcher to the study's list and the study to the researcher's.
///
/// Both lists are sets, so repeating the call changes nothing.
pub async fn associate_researcher_with_study(
    study_id: RecordId,
    researcher_id: RecordId,
    db: &Db,
) -> ApiResult<AssociationOutcome> {
    let study_updated = db
        .collection::<Study>()
        .add_to_set(study_id, RESEARCHER_LIST, researcher_id)
        .await?;
    let researcher_updated = db
        .collection::<Researcher>()
        .add_to_set(researcher_id, STUDY_LIST, study_id)
        .await?;

    let outcome = AssociationOutcome {
        study_updated,
        researcher_updated,
    };
    if !outcome.succeeded() {
        tracing::warn!(
            study = %study_id,
            researcher = %researcher_id,
            ?outcome,
            "researcher and study only partly associated"
        );
    }

    Ok(outcome)
}

/// Removes the link from both sides.
///
/// This does not protect the study's creator; use
/// [remove_researcher_from_study] for requests.
pub async fn remove_association(
    study_id: RecordId,
    researcher_id: RecordId,
    db: &Db,
) -> ApiResult<AssociationOutcome> {
    let researcher_updated = db
        .collection::<Researcher>()
        .pull(researcher_id, STUDY_LIST, study_id)
        .await?;
    let study_updated = db
        .collection::<Study>()
        .pull(study_id, RESEARCHER_LIST, researcher_id)
        .await?;

    let outcome = AssociationOutcome {
        study_updated,
        researcher_updated,
    };
    if !outcome.succeeded() {
        tracing::warn!(
            study = %study_id,
            researcher = %researcher_id,
            ?outcome,
            "researcher and study only partly disassociated"
        );
    }

    Ok(outcome)
}

/// Takes a researcher off a study, unless they created it.
pub async fn remove_researcher_from_study(
    study_id: RecordId,
    researcher_id: RecordId,
    db: &Db,
) -> ApiResult<AssociationOutcome> {
    let study = Study::with_id(study_id, db).await?;
    if study.creator == researcher_id {
        return Err(ApiError::PolicyViolation(
            "Can not remove the creator of a study".to_owned(),
        ));
    }

    remove_association(study_id, researcher_id, db).await
}

/// A newly created study, and whether it made it onto its creator's list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedStudy {
    pub study: Study,
    pub researcher_updated: bool,
}

/// Creates a study with its creator as the first researcher on it.
pub async fn create_study(
    creator_id: RecordId,
    new_study: NewStudy,
    db: &Db,
) -> ApiResult<CreatedStudy> {
    Researcher::with_id(creator_id, db).await?;

    let study = db
        .collection::<Study>()
        .create(&new_study.into_study(creator_id))
        .await?;
    let researcher_updated = db
        .collection::<Researcher>()
        .add_to_set(creator_id, STUDY_LIST, study.id)
        .await?;

    Ok(CreatedStudy {
        study,
        researcher_updated,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyResearcherDetails {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
}

/// A researcher registered while being added to a study.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedResearcher {
    pub researcher: ResearcherProfile,
    /// The generated password, only ever shown here
    pub temporary_password: String,
    pub association: AssociationOutcome,
}

pub fn temporary_password() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Registers a researcher and puts them straight onto an existing study.
///
/// Their username is the part of their email before the `@`.
pub async fn add_new_researcher_to_study(
    study_id: RecordId,
    details: StudyResearcherDetails,
    db: &Db,
) -> ApiResult<AddedResearcher> {
    Study::with_id(study_id, db).await?;

    let temporary_password = temporary_password();
    let researcher = Researcher::register(
        NewResearcher {
            username: email_local_part(&details.email).to_owned(),
            first_name: details.first_name,
            last_name: details.last_name,
            email: details.email,
            password: temporary_password.clone(),
        },
        db,
    )
    .await?;

    let association = associate_researcher_with_study(study_id, researcher.id, db).await?;

    Ok(AddedResearcher {
        researcher: ResearcherProfile::from(&researcher),
        temporary_password,
        association,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mock::{mock_new_study, mock_researcher};

    async fn study_by(creator: &Researcher, code: &str, db: &Db) -> Study {
        create_study(creator.id, mock_new_study(code), db)
            .await
            .unwrap()
            .study
    }

    #[tokio::test]
    async fn created_studies_are_linked_to_their_creator() {
        let db = Db::in_memory();
        let creator = mock_researcher("ada", &db).await;

        let created = create_study(creator.id, mock_new_study("S-1"), &db)
            .await
            .unwrap();

        assert!(created.researcher_updated);
        assert!(created.study.researcher_list.contains(&creator.id));
        let creator = Researcher::with_id(creator.id, &db).await.unwrap();
        assert!(creator.study_list.contains(&created.study.id));
    }

    #[tokio::test]
    async fn studies_need_an_existing_creator() {
        let db = Db::in_memory();
        let result = create_study(RecordId::new(), mock_new_study("S-1"), &db).await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert!(Study::all(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn association_links_both_sides_once() {
        let db = Db::in_memory();
        let creator = mock_researcher("ada", &db).await;
        let other = mock_researcher("grace", &db).await;
        let study = study_by(&creator, "S-1", &db).await;

        for _ in 0..2 {
            let outcome = associate_researcher_with_study(study.id, other.id, &db)
                .await
                .unwrap();
            assert!(outcome.succeeded());
        }

        let study = Study::with_id(study.id, &db).await.unwrap();
        let other = Researcher::with_id(other.id, &db).await.unwrap();
        assert_eq!(study.researcher_list.as_slice(), &[creator.id, other.id]);
        assert_eq!(other.study_list.as_slice(), &[study.id]);
    }

    #[tokio::test]
    async fn association_reports_the_missing_side() {
        let db = Db::in_memory();
        let creator = mock_researcher("ada", &db).await;
        let study = study_by(&creator, "S-1", &db).await;

        let outcome = associate_researcher_with_study(study.id, RecordId::new(), &db)
            .await
            .unwrap();

        assert!(outcome.study_updated);
        assert!(!outcome.researcher_updated);
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn removal_unlinks_both_sides() {
        let db = Db::in_memory();
        let creator = mock_researcher("ada", &db).await;
        let other = mock_researcher("grace", &db).await;
        let study = study_by(&creator, "S-1", &db).await;
        associate_researcher_with_study(study.id, other.id, &db)
            .await
            .unwrap();

        let outcome = remove_researcher_from_study(study.id, other.id, &db)
            .await
            .unwrap();

        assert!(outcome.succeeded());
        let study = Study::with_id(study.id, &db).await.unwrap();
        let other = Researcher::with_id(other.id, &db).await.unwrap();
        assert!(!study.researcher_list.contains(&other.id));
        assert!(other.study_list.is_empty());
    }

    #[tokio::test]
    async fn the_creator_cannot_be_removed() {
        let db = Db::in_memory();
        let creator = mock_researcher("ada", &db).await;
        let study = study_by(&creator, "S-1", &db).await;

        let result = remove_researcher_from_study(study.id, creator.id, &db).await;

        assert!(matches!(result, Err(ApiError::PolicyViolation(_))));
        let study = Study::with_id(study.id, &db).await.unwrap();
        let creator = Researcher::with_id(creator.id, &db).await.unwrap();
        assert!(study.researcher_list.contains(&creator.id));
        assert!(creator.study_list.contains(&study.id));
    }

    #[tokio::test]
    async fn new_researchers_get_a_username_and_a_study() {
        let db = Db::in_memory();
        let creator = mock_researcher("ada", &db).await;
        let study = study_by(&creator, "S-1", &db).await;

        let added = add_new_researcher_to_study(
            study.id,
            StudyResearcherDetails {
                first_name: "Grace".to_owned(),
                last_name: "Hopper".to_owned(),
                email: "grace.hopper@uni.edu".to_owned(),
            },
            &db,
        )
        .await
        .unwrap();

        assert_eq!(added.researcher.username, "grace.hopper");
        assert!(added.association.succeeded());
        assert!(Researcher::check_login("grace.hopper", &added.temporary_password, &db)
            .await
            .unwrap()
            .is_some());
        let study = Study::with_id(study.id, &db).await.unwrap();
        assert!(study.researcher_list.contains(&added.researcher.id));
    }
}
