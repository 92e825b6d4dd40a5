use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bulk_insert_response, no_content_or_not_found, toggled, AppState, ToggleRequest};
use crate::consistency::{
    insert_deduplicated, participant_should_keep_info, toggle_flag, ParticipantFlag,
};
use crate::error::ApiResult;
use crate::extract::{JsonBody, PathId};
use crate::models::participant::{NewParticipant, Participant, ParticipantId, ParticipantUpdate};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/add", post(add_participants))
        .route("/all", get(get_all))
        .route("/check/:id", get(check_keep_info))
        .route("/toggle-property", put(toggle_property))
        .route(
            "/:id",
            get(get_participant)
                .put(update_participant)
                .delete(delete_participant),
        )
}

#[derive(Deserialize)]
pub struct NewParticipants {
    participants: Vec<NewParticipant>,
}

async fn add_participants(
    State(state): State<AppState>,
    JsonBody(NewParticipants { participants }): JsonBody<NewParticipants>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let candidates = participants.into_iter().map(Participant::from).collect();
    let result = insert_deduplicated(candidates, &state.db).await?;

    Ok(bulk_insert_response(result, "participants"))
}

async fn get_all(State(state): State<AppState>) -> ApiResult<Json<Vec<ParticipantId>>> {
    Participant::all_ids(&state.db).await.map(Json)
}

async fn get_participant(
    State(state): State<AppState>,
    PathId(id): PathId,
) -> ApiResult<Json<Participant>> {
    Participant::with_id(id, &state.db).await.map(Json)
}

async fn check_keep_info(
    State(state): State<AppState>,
    PathId(id): PathId,
) -> ApiResult<Json<Value>> {
    let should_keep_info = participant_should_keep_info(id, &state.db).await?;

    Ok(Json(json!({ "shouldKeepInfo": should_keep_info })))
}

async fn toggle_property(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ToggleRequest>,
) -> ApiResult<Json<Value>> {
    let flag: ParticipantFlag = request.property_name.parse()?;
    let count = toggle_flag(&request.ids, flag, &state.db).await?;
    tracing::info!(?flag, count, "toggled participant property");

    Ok(toggled(count))
}

async fn update_participant(
    State(state): State<AppState>,
    PathId(id): PathId,
    JsonBody(update): JsonBody<ParticipantUpdate>,
) -> ApiResult<StatusCode> {
    let found = Participant::update(id, &update, &state.db).await?;
    if found {
        tracing::info!(participant = %id, "participant updated");
    }

    no_content_or_not_found(found, format!("Participant {}", id))
}

async fn delete_participant(
    State(state): State<AppState>,
    PathId(id): PathId,
) -> ApiResult<StatusCode> {
    let found = Participant::delete(id, &state.db).await?;
    if found {
        tracing::info!(participant = %id, "participant deleted");
    }

    no_content_or_not_found(found, format!("Participant {}", id))
}
