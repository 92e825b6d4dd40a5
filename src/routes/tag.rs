use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use super::{bulk_insert_response, no_content_or_not_found, AppState};
use crate::consistency::{delete_tag, insert_deduplicated};
use crate::error::ApiResult;
use crate::extract::{JsonBody, PathId};
use crate::models::tag::{NewTag, Tag};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/all", get(get_all))
        .route("/add", post(add_tags))
        .route("/:id", get(get_tag).put(update_tag).delete(remove_tag))
}

async fn get_all(State(state): State<AppState>) -> ApiResult<Json<Vec<Tag>>> {
    Tag::all(&state.db).await.map(Json)
}

async fn get_tag(State(state): State<AppState>, PathId(id): PathId) -> ApiResult<Json<Tag>> {
    Tag::with_id(id, &state.db).await.map(Json)
}

#[derive(Deserialize)]
pub struct NewTags {
    tags: Vec<NewTag>,
}

async fn add_tags(
    State(state): State<AppState>,
    JsonBody(NewTags { tags }): JsonBody<NewTags>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let candidates = tags.into_iter().map(Tag::from).collect();
    let result = insert_deduplicated(candidates, &state.db).await?;

    Ok(bulk_insert_response(result, "tags"))
}

/// Renames a tag.
async fn update_tag(
    State(state): State<AppState>,
    PathId(id): PathId,
    JsonBody(update): JsonBody<NewTag>,
) -> ApiResult<StatusCode> {
    let found = Tag::update(id, &update, &state.db).await?;
    if found {
        tracing::info!(tag = %id, name = %update.tag_name, "tag renamed");
    }

    no_content_or_not_found(found, format!("Tag {}", id))
}

/// Deletes a tag and untags every participant that had it.
async fn remove_tag(State(state): State<AppState>, PathId(id): PathId) -> ApiResult<StatusCode> {
    no_content_or_not_found(delete_tag(id, &state.db).await?, format!("Tag {}", id))
}
