use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{no_content_or_not_found, toggled, AppState, ToggleRequest};
use crate::consistency::{enroll_participants, toggle_flag, StudyParticipantFlag};
use crate::error::ApiResult;
use crate::extract::{JsonBody, PathId};
use crate::models::study_participant::{StudyParticipant, StudyParticipantUpdate};
use crate::models::RecordId;

/// `/:id` is a study id for `GET` and `POST`, and an enrolment id for `PUT`
/// and `DELETE`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/count/:id", get(count_active))
        .route("/toggle-property", put(toggle_property))
        .route(
            "/:id",
            get(get_for_study)
                .post(enroll)
                .put(update_enrolment)
                .delete(delete_enrolment),
        )
}

async fn count_active(
    State(state): State<AppState>,
    PathId(study_id): PathId,
) -> ApiResult<Json<Value>> {
    let count = StudyParticipant::count_active(study_id, &state.db).await?;

    Ok(Json(json!({ "count": count })))
}

async fn get_for_study(
    State(state): State<AppState>,
    PathId(study_id): PathId,
) -> ApiResult<Response> {
    let views = StudyParticipant::populated_for_study(study_id, &state.db).await?;

    if views.is_empty() {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(Json(views).into_response())
    }
}

/// Either a single participant id or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(RecordId),
    Many(Vec<RecordId>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<RecordId> {
        match self {
            OneOrMany::One(id) => vec![id],
            OneOrMany::Many(ids) => ids,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrolment {
    participant_ids: OneOrMany,
}

async fn enroll(
    State(state): State<AppState>,
    PathId(study_id): PathId,
    JsonBody(enrolment): JsonBody<Enrolment>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let participant_ids = enrolment.participant_ids.into_vec();
    let enrollment = enroll_participants(study_id, &participant_ids, &state.db).await?;

    let created_ids: Vec<RecordId> = enrollment.created.iter().map(|row| row.id).collect();
    let created = StudyParticipant::populated_with_ids(&created_ids, &state.db).await?;

    if enrollment.failed.is_empty() {
        Ok((StatusCode::CREATED, Json(json!(created))))
    } else {
        Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Failed to fully add study-participants",
                "failedDetails": enrollment.failed,
                "success": created,
            })),
        ))
    }
}

async fn toggle_property(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ToggleRequest>,
) -> ApiResult<Json<Value>> {
    let flag: StudyParticipantFlag = request.property_name.parse()?;
    let count = toggle_flag(&request.ids, flag, &state.db).await?;
    tracing::info!(?flag, count, "toggled study-participant property");

    Ok(toggled(count))
}

async fn update_enrolment(
    State(state): State<AppState>,
    PathId(id): PathId,
    JsonBody(update): JsonBody<StudyParticipantUpdate>,
) -> ApiResult<StatusCode> {
    let found = StudyParticipant::update(id, &update, &state.db).await?;
    if found {
        tracing::info!(study_participant = %id, "study-participant updated");
    }

    no_content_or_not_found(found, format!("Study-participant {}", id))
}

async fn delete_enrolment(
    State(state): State<AppState>,
    PathId(id): PathId,
) -> ApiResult<StatusCode> {
    let found = StudyParticipant::delete(id, &state.db).await?;
    if found {
        tracing::info!(study_participant = %id, "study-participant deleted");
    }

    no_content_or_not_found(found, format!("Study-participant {}", id))
}
