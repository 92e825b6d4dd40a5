use crate::db::{Db, Filter, Update};
use crate::error::ApiResult;
use crate::models::participant::Participant;
use crate::models::researcher::Researcher;
use crate::models::study::Study;
use crate::models::tag::Tag;
use crate::models::RecordId;

/// Deletes a study and takes it off every researcher's study list.
///
/// Returns whether the study existed.
pub async fn delete_study(study_id: RecordId, db: &Db) -> ApiResult<bool> {
    if !db.collection::<Study>().delete(study_id).await? {
        return Ok(false);
    }

    let unlinked = db
        .collection::<Researcher>()
        .update_many(
            &Filter::Contains("studyList", study_id.into()),
            &Update::Pull("studyList", study_id.into()),
        )
        .await?;
    tracing::info!(study = %study_id, researchers = unlinked, "deleted study");

    Ok(true)
}

/// Deletes a tag and removes it from every participant carrying it.
///
/// Returns whether the tag existed.
pub async fn delete_tag(tag_id: RecordId, db: &Db) -> ApiResult<bool> {
    if !db.collection::<Tag>().delete(tag_id).await? {
        return Ok(false);
    }

    let untagged = db
        .collection::<Participant>()
        .update_many(
            &Filter::Contains("tag", tag_id.into()),
            &Update::Pull("tag", tag_id.into()),
        )
        .await?;
    tracing::info!(tag = %tag_id, participants = untagged, "deleted tag");

    Ok(true)
}
