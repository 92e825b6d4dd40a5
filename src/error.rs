//! Error handling for the API.
//!
//! Prefer adding a variant to [ApiError] over forcing a new failure mode
//! into `BadRequest` or a generic `ServerError`, and document its status
//! code and JSON body alongside the others.

use std::sync::OnceLock;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::db::StoreError;

static EXPOSE_INTERNAL_ERRORS: OnceLock<bool> = OnceLock::new();

const GENERIC_SERVER_ERROR: &str = "Internal server error.";

/// Chooses whether 500 responses carry the underlying error message.
///
/// Called once at startup; outside production the details are included.
pub fn expose_internal_errors(expose: bool) {
    let _ = EXPOSE_INTERNAL_ERRORS.set(expose);
}

/// The error enum for all error handling across the API.
///
/// See each variant for its corresponding status code and JSON body. Every
/// body also carries `message` and `statusCode`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// \[400\] The request was malformed.
    ///
    /// ```json
    /// { "message": "bad request", "statusCode": 400, "reason": <reason> }
    /// ```
    #[error("bad request")]
    BadRequest(String),
    /// \[400\] The request was well-formed but breaks a data rule, such as
    /// removing a study's creator from its researcher list.
    ///
    /// ```json
    /// { "message": "policy violation", "statusCode": 400, "reason": <reason> }
    /// ```
    #[error("policy violation")]
    PolicyViolation(String),
    /// \[400\] A unique field already holds the given value.
    ///
    /// ```json
    /// { "message": "duplicate value", "statusCode": 400, "field": <field>, "value": <value> }
    /// ```
    #[error("duplicate value")]
    Conflict { field: String, value: String },
    /// \[404\] The requested record does not exist.
    ///
    /// ```json
    /// { "message": "resource not found", "statusCode": 404, "reason": <what was missing> }
    /// ```
    #[error("resource not found")]
    NotFound(String),
    /// \[401\] Bad login credentials, or a missing or invalid token.
    ///
    /// ```json
    /// { "message": "login required", "statusCode": 401, "reason": <reason> }
    /// ```
    #[error("login required")]
    Unauthorized(String),
    /// \[500\] Something unexpected went wrong while handling the request.
    ///
    /// ```json
    /// { "message": "server error", "statusCode": 500, "error": <error message> }
    /// ```
    #[error("server error")]
    ServerError(String),
    /// \[500\] The document store failed.
    ///
    /// ```json
    /// { "message": "database error", "statusCode": 500, "error": <error message> }
    /// ```
    #[error("database error")]
    DbError(StoreError),
}

/// The return type for all endpoints.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::PolicyViolation(_) | ApiError::Conflict { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::ServerError(_) | ApiError::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_response(&self, expose_internal: bool) -> (StatusCode, Value) {
        let mut json_val = match self {
            ApiError::BadRequest(reason)
            | ApiError::PolicyViolation(reason)
            | ApiError::NotFound(reason)
            | ApiError::Unauthorized(reason) => json!({ "reason": reason }),
            ApiError::Conflict { field, value } => json!({ "field": field, "value": value }),
            ApiError::ServerError(error) if expose_internal => json!({ "error": error }),
            ApiError::DbError(error) if expose_internal => json!({ "error": error.to_string() }),
            ApiError::ServerError(_) | ApiError::DbError(_) => {
                json!({ "error": GENERIC_SERVER_ERROR })
            }
        };

        let status = self.status();
        json_val["statusCode"] = json!(status.as_u16());
        json_val["message"] = json!(self.to_string());

        (status, json_val)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Duplicate { field, value, .. } => ApiError::Conflict { field, value },
            missing @ StoreError::MissingField { .. } => ApiError::BadRequest(missing.to_string()),
            other => ApiError::DbError(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::warn!(error = ?self, "request rejected");
        }

        let expose = EXPOSE_INTERNAL_ERRORS.get().copied().unwrap_or(true);
        let (status, body) = self.as_response(expose);

        (status, Json(body)).into_response()
    }
}
