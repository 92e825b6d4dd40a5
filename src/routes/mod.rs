//! All routes for the API.
//!
//! Routes are grouped by resource, one module each, and nested under the
//! resource's prefix. Everything except `POST /researcher/login` requires a
//! token (see [require_token](crate::auth::require_token)).

pub mod participant;
pub mod researcher;
pub mod session;
pub mod study;
pub mod study_participant;
pub mod tag;

use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{require_token, TokenIssuer};
use crate::consistency::DeduplicatedInsert;
use crate::db::Db;
use crate::models::RecordId;

/// Everything a handler needs, shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub tokens: Arc<TokenIssuer>,
}

impl AppState {
    pub fn new(db: Db, tokens: TokenIssuer) -> Self {
        Self {
            db,
            tokens: Arc::new(tokens),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .nest("/researcher", researcher::routes())
        .nest("/study", study::routes())
        .nest("/participant", participant::routes())
        .nest("/study-participants", study_participant::routes())
        .nest("/tag", tag::routes())
        .nest("/session", session::routes())
        .route_layer(from_fn_with_state(state.clone(), require_token));

    let public = Router::new().route("/researcher/login", post(researcher::login));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allows cross-origin requests from `origin`, or from anywhere if unset.
pub fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    Ok(match origin {
        Some(origin) => layer.allow_origin(HeaderValue::from_str(origin)?),
        None => layer.allow_origin(Any),
    })
}

pub fn basic_success(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": message.into() }))
}

/// The body of `PUT /<resource>/toggle-property`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub ids: Vec<RecordId>,
    pub property_name: String,
}

pub fn toggled(count: u64) -> Json<Value> {
    basic_success(format!("{} documents updated successfully.", count))
}

/// 204 when something was written, or a 404 naming what was missing.
pub fn no_content_or_not_found(found: bool, what: String) -> crate::error::ApiResult<StatusCode> {
    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(crate::error::ApiError::not_found(what))
    }
}

/// 201 with what was stored and what already existed, or 400 with the
/// failures as well when some candidates could not be stored.
pub fn bulk_insert_response<T: Serialize>(
    result: DeduplicatedInsert<T>,
    what: &str,
) -> (StatusCode, Json<Value>) {
    if result.fully_succeeded() {
        tracing::info!(
            created = result.success.len(),
            existing = result.existing.len(),
            "created {}",
            what
        );
        (
            StatusCode::CREATED,
            Json(json!({
                "success": result.success,
                "existing": result.existing,
            })),
        )
    } else {
        tracing::warn!(
            created = result.success.len(),
            failed = result.failed.len(),
            "failed to fully create {}",
            what
        );
        (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("Failed to fully create {}", what),
                "failedDetails": result.failed,
                "success": result.success,
                "existing": result.existing,
            })),
        )
    }
}
