// src/error.rs

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use validator::ValidationErrors;

use crate::store::StoreError;

/// Why a credential check failed. Every variant surfaces to the client as the
/// same `InvalidCredentials` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRejection {
    UnknownEmail,
    WrongPassword,
    Inactive,
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // 500 Internal Server Error
    #[error("internal server error: {0}")]
    InternalServerError(String),

    // 400 Bad Request
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("email already registered")]
    EmailTaken,

    #[error("invalid credentials ({0:?})")]
    InvalidCredentials(LoginRejection),

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("no pending two-factor login")]
    NoPendingSession,

    #[error("two-factor code expired")]
    CodeExpired,

    #[error("too many two-factor attempts")]
    TooManyAttempts,

    #[error("invalid two-factor code")]
    InvalidCode,

    #[error("two-factor resend limit reached")]
    ResendLimitReached,

    // 401 Unauthorized
    #[error("unauthorized: {0}")]
    AuthError(String),

    // 403 Forbidden
    #[error("forbidden: {0}")]
    Forbidden(String),

    // 404 Not Found
    #[error("not found: {0}")]
    NotFound(String),

    // 409 Conflict (e.g., ordering a reserved listing)
    #[error("conflict: {0}")]
    Conflict(String),
}

fn field_error(field: &str, message: &str) -> serde_json::Value {
    json!({ "errors": { field: [message] } })
}

fn message(text: impl Into<String>) -> serde_json::Value {
    json!({ "error": text.into() })
}

/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    message("Internal Server Error"),
                )
            }
            AppError::Validation(errors) => {
                let fields: serde_json::Map<String, serde_json::Value> = errors
                    .field_errors()
                    .into_iter()
                    .map(|(field, errs)| {
                        let messages: Vec<String> = errs
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map(|m| m.to_string())
                                    .unwrap_or_else(|| format!("invalid value ({})", e.code))
                            })
                            .collect();
                        (field.to_string(), json!(messages))
                    })
                    .collect();
                (StatusCode::BAD_REQUEST, json!({ "errors": fields }))
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, message(msg)),
            AppError::PasswordMismatch => (
                StatusCode::BAD_REQUEST,
                field_error("confirm_password", "Passwords do not match"),
            ),
            AppError::EmailTaken => (
                StatusCode::BAD_REQUEST,
                field_error("email", "Email is already registered"),
            ),
            AppError::InvalidCredentials(reason) => {
                tracing::info!(?reason, "Login rejected");
                (
                    StatusCode::BAD_REQUEST,
                    message("Invalid credentials or email not verified"),
                )
            }
            AppError::InvalidToken => (StatusCode::BAD_REQUEST, message("Invalid or expired link")),
            AppError::NoPendingSession => (
                StatusCode::BAD_REQUEST,
                message("No 2FA session found. Please login again."),
            ),
            AppError::CodeExpired => (
                StatusCode::BAD_REQUEST,
                message("Code expired. Please login again."),
            ),
            AppError::TooManyAttempts => (
                StatusCode::BAD_REQUEST,
                message("Too many attempts. Please login again."),
            ),
            AppError::InvalidCode => (StatusCode::BAD_REQUEST, message("Invalid code")),
            AppError::ResendLimitReached => (
                StatusCode::BAD_REQUEST,
                message("Maximum resend attempts reached."),
            ),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, message(msg)),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, message(msg)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, message(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, message(msg)),
        };

        (status, Json(body)).into_response()
    }
}

/// Allows using `?` on store calls. Handlers that need a more specific error
/// (duplicate email, order conflict) match on the store error first.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("Resource not found".to_string()),
            StoreError::Duplicate => AppError::Conflict("Resource already exists".to_string()),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Unavailable(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// `Json` extractor whose rejection is an `AppError`, so malformed bodies get
/// the same JSON error shape as every other failure.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);
