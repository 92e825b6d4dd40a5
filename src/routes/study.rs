use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::{no_content_or_not_found, AppState};
use crate::consistency::{
    add_new_researcher_to_study, associate_researcher_with_study, create_study, delete_study,
    remove_researcher_from_study, AssociationOutcome, StudyResearcherDetails,
};
use crate::error::{ApiError, ApiResult};
use crate::extract::{JsonBody, PathId, PathIds};
use crate::models::researcher::ResearcherProfile;
use crate::models::study::{NewStudy, Study, StudyUpdate};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/:id",
            get(get_study)
                .put(update_study)
                .delete(remove_study)
                .post(new_study),
        )
        .route("/researcher/list/:id", get(get_researchers))
        .route("/associateResearcher/:id/:researcher_id", put(associate))
        .route("/removeResearcher/:id/:researcher_id", put(disassociate))
        .route("/addResearcher/:id", post(add_researcher))
}

async fn get_study(State(state): State<AppState>, PathId(id): PathId) -> ApiResult<Json<Study>> {
    Study::with_id(id, &state.db).await.map(Json)
}

async fn update_study(
    State(state): State<AppState>,
    PathId(id): PathId,
    JsonBody(update): JsonBody<StudyUpdate>,
) -> ApiResult<Json<Study>> {
    if !Study::update(id, &update, &state.db).await? {
        return Err(ApiError::not_found(format!("Study {}", id)));
    }
    tracing::info!(study = %id, "study updated");

    Study::with_id(id, &state.db).await.map(Json)
}

async fn remove_study(State(state): State<AppState>, PathId(id): PathId) -> ApiResult<StatusCode> {
    no_content_or_not_found(delete_study(id, &state.db).await?, format!("Study {}", id))
}

/// Creates a study owned by the researcher in the path.
async fn new_study(
    State(state): State<AppState>,
    PathId(researcher_id): PathId,
    JsonBody(study): JsonBody<NewStudy>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let created = create_study(researcher_id, study, &state.db).await?;
    tracing::info!(
        study = %created.study.id,
        creator = %researcher_id,
        "study created"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Study created and associated with researcher",
            "study": created.study,
            "researcherUpdated": created.researcher_updated,
        })),
    ))
}

async fn get_researchers(
    State(state): State<AppState>,
    PathId(id): PathId,
) -> ApiResult<Json<Vec<ResearcherProfile>>> {
    let study = Study::with_id(id, &state.db).await?;

    study.researchers(&state.db).await.map(Json)
}

fn association_response(
    outcome: AssociationOutcome,
    success: &str,
    failure: &str,
) -> (StatusCode, Json<Value>) {
    let (status, message) = if outcome.succeeded() {
        (StatusCode::OK, success)
    } else {
        (StatusCode::BAD_REQUEST, failure)
    };

    (
        status,
        Json(json!({
            "message": message,
            "studyUpdated": outcome.study_updated,
            "researcherUpdated": outcome.researcher_updated,
        })),
    )
}

async fn associate(
    State(state): State<AppState>,
    PathIds(study_id, researcher_id): PathIds,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let outcome = associate_researcher_with_study(study_id, researcher_id, &state.db).await?;
    if outcome.succeeded() {
        tracing::info!(study = %study_id, researcher = %researcher_id, "researcher associated with study");
    }

    Ok(association_response(
        outcome,
        "Researcher associated with study",
        "Can not associate researcher with study",
    ))
}

async fn disassociate(
    State(state): State<AppState>,
    PathIds(study_id, researcher_id): PathIds,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let outcome = remove_researcher_from_study(study_id, researcher_id, &state.db).await?;
    if outcome.succeeded() {
        tracing::info!(study = %study_id, researcher = %researcher_id, "researcher removed from study");
    }

    Ok(association_response(
        outcome,
        "Researcher removed from study and study removed from researcher",
        "Error removing researcher from study",
    ))
}

async fn add_researcher(
    State(state): State<AppState>,
    PathId(study_id): PathId,
    JsonBody(details): JsonBody<StudyResearcherDetails>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let added = add_new_researcher_to_study(study_id, details, &state.db).await?;
    tracing::info!(
        study = %study_id,
        researcher = %added.researcher.id,
        "new researcher added to study"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "New researcher added & study updated successfully",
            "username": added.researcher.username,
            "result": added,
        })),
    ))
}
