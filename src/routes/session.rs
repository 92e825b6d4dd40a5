use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use super::{no_content_or_not_found, AppState};
use crate::error::ApiResult;
use crate::extract::{JsonBody, PathId};
use crate::models::session::{NewSession, Session, SessionParticipant, SessionUpdate, SessionView};

/// `/:id` is a study id for `POST`, and a session id otherwise.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/list/:id", get(get_for_study))
        .route("/participant/list/:id", get(get_participants))
        .route(
            "/:id",
            get(get_session)
                .post(new_session)
                .put(update_session)
                .delete(delete_session),
        )
}

async fn get_for_study(
    State(state): State<AppState>,
    PathId(study_id): PathId,
) -> ApiResult<Json<Vec<SessionView>>> {
    Session::for_study(study_id, &state.db).await.map(Json)
}

async fn get_session(State(state): State<AppState>, PathId(id): PathId) -> ApiResult<Json<Session>> {
    Session::with_id(id, &state.db).await.map(Json)
}

async fn get_participants(
    State(state): State<AppState>,
    PathId(id): PathId,
) -> ApiResult<Json<Vec<SessionParticipant>>> {
    let session = Session::with_id(id, &state.db).await?;
    let participants = session.participants(&state.db).await?;

    Ok(Json(participants.iter().map(SessionParticipant::from).collect()))
}

async fn new_session(
    State(state): State<AppState>,
    PathId(study_id): PathId,
    JsonBody(session): JsonBody<NewSession>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let session = Session::create(study_id, session, &state.db).await?;
    tracing::info!(study = %study_id, session = %session.id, "session created");

    Ok((StatusCode::CREATED, Json(session)))
}

async fn update_session(
    State(state): State<AppState>,
    PathId(id): PathId,
    JsonBody(update): JsonBody<SessionUpdate>,
) -> ApiResult<StatusCode> {
    let found = Session::update(id, &update, &state.db).await?;
    if found {
        tracing::info!(session = %id, "session updated");
    }

    no_content_or_not_found(found, format!("Session {}", id))
}

async fn delete_session(State(state): State<AppState>, PathId(id): PathId) -> ApiResult<StatusCode> {
    let found = Session::delete(id, &state.db).await?;
    if found {
        tracing::info!(session = %id, "session deleted");
    }

    no_content_or_not_found(found, format!("Session {}", id))
}
