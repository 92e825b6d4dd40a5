use axum::extract::{Path, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{basic_success, AppState};
use crate::auth::{CurrentResearcher, TOKEN_COOKIE};
use crate::consistency::association::temporary_password;
use crate::error::{ApiError, ApiResult};
use crate::extract::{JsonBody, PathId};
use crate::models::researcher::{NewResearcher, Researcher, ResearcherProfile, ResearcherUpdate};
use crate::models::study::{Study, StudyReport};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/logout", get(logout))
        .route("/info/:id", get(get_info))
        .route("/update/info", put(update_info))
        .route("/resetPwd", put(reset_password))
        .route("/list/:id", get(get_study_list))
        .route("/email/:email", get(get_by_email))
        .route("/add", post(add_researcher))
        .route("/studyList/:id", get(get_study_reports))
        .route("/search", get(search))
}

#[derive(Deserialize)]
pub struct LoginInfo {
    username: String,
    password: String,
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(form): JsonBody<LoginInfo>,
) -> ApiResult<Response> {
    let researcher = Researcher::check_login(&form.username, &form.password, &state.db)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Username or password error".to_owned()))?;
    let token = state.tokens.issue(researcher.id)?;
    let cookie = format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}",
        TOKEN_COOKIE,
        token,
        state.tokens.lifetime().whole_seconds()
    );
    tracing::info!(researcher = %researcher.id, "researcher logged in");

    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({
            "message": "Login Success",
            "id": researcher.id,
            "token": token,
        })),
    )
        .into_response())
}

async fn logout(Extension(CurrentResearcher(id)): Extension<CurrentResearcher>) -> Response {
    tracing::info!(researcher = %id, "researcher logged out");

    (
        [(SET_COOKIE, format!("{}=; HttpOnly; Path=/; Max-Age=0", TOKEN_COOKIE))],
        basic_success("Logout Success"),
    )
        .into_response()
}

async fn get_info(State(state): State<AppState>, PathId(id): PathId) -> ApiResult<Json<Value>> {
    let researcher = Researcher::with_id(id, &state.db).await?;

    Ok(Json(json!({
        "message": "User Info",
        "result": ResearcherProfile::from(&researcher),
    })))
}

/// Researchers may only edit their own details.
async fn update_info(
    State(state): State<AppState>,
    Extension(CurrentResearcher(id)): Extension<CurrentResearcher>,
    JsonBody(update): JsonBody<ResearcherUpdate>,
) -> ApiResult<Json<Value>> {
    if !Researcher::update_info(id, &update, &state.db).await? {
        return Err(ApiError::not_found(format!("Researcher {}", id)));
    }
    tracing::info!(researcher = %id, "researcher info updated");

    Ok(basic_success("Update success"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    current_pwd: String,
    new_pwd: String,
}

async fn reset_password(
    State(state): State<AppState>,
    Extension(CurrentResearcher(id)): Extension<CurrentResearcher>,
    JsonBody(reset): JsonBody<PasswordReset>,
) -> ApiResult<Json<Value>> {
    Researcher::reset_password(id, &reset.current_pwd, &reset.new_pwd, &state.db).await?;
    tracing::info!(researcher = %id, "researcher password reset");

    Ok(basic_success("Reset password success"))
}

async fn get_study_list(
    State(state): State<AppState>,
    PathId(id): PathId,
) -> ApiResult<Json<Vec<Study>>> {
    let researcher = Researcher::with_id(id, &state.db).await?;
    let studies = Study::with_ids(researcher.study_list.as_slice(), &state.db).await?;

    Ok(Json(studies))
}

async fn get_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Response> {
    match Researcher::with_email_opt(&email, &state.db).await? {
        Some(researcher) => Ok(Json(ResearcherProfile::from(&researcher)).into_response()),
        None => {
            tracing::warn!(%email, "no researcher with this email");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

/// A new researcher account. Without a password, one is generated and
/// returned once in the response.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearcherSignup {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    email: String,
    username: String,
    password: Option<String>,
}

async fn add_researcher(
    State(state): State<AppState>,
    JsonBody(signup): JsonBody<ResearcherSignup>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (password, generated_password) = match signup.password {
        Some(password) => (password, None),
        None => {
            let generated = temporary_password();
            (generated.clone(), Some(generated))
        }
    };
    let researcher = Researcher::register(
        NewResearcher {
            first_name: signup.first_name,
            last_name: signup.last_name,
            email: signup.email,
            username: signup.username,
            password,
        },
        &state.db,
    )
    .await?;
    tracing::info!(researcher = %researcher.id, username = %researcher.username, "researcher created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Create new researcher success",
            "researcher": ResearcherProfile::from(&researcher),
            "temporaryPassword": generated_password,
        })),
    ))
}

async fn get_study_reports(
    State(state): State<AppState>,
    PathId(id): PathId,
) -> ApiResult<Json<Vec<StudyReport>>> {
    let reports = StudyReport::for_researcher(id, &state.db).await?;
    tracing::info!(researcher = %id, studies = reports.len(), "study reports retrieved");

    Ok(Json(reports))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    first_name: Option<String>,
    last_name: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<ResearcherProfile>>> {
    let researchers = Researcher::search(
        params.first_name.as_deref(),
        params.last_name.as_deref(),
        &state.db,
    )
    .await?;

    Ok(Json(researchers.iter().map(ResearcherProfile::from).collect()))
}
