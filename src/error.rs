use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{password::PasswordError, repository::StoreError, token::TokenError};

/// AppResult
///
/// Result alias returned by every service method and fallible handler.
pub type AppResult<T> = Result<T, AppError>;

/// AppError
///
/// The error taxonomy shared by the service and request layers. Services pick the kind;
/// `IntoResponse` turns it into a status code plus a stable message. Internal details are
/// logged and never sent to the caller.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {} errors", .0.len())]
    Validation(Vec<ValidationErrorDetail>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// ValidationErrorDetail
///
/// One failed field from request validation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// ErrorResponse
///
/// JSON body for every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable kind, e.g. `not_found`.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Store failures: unique violations become Conflict, broken foreign keys mean the
/// referenced row is gone, anything else is internal.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(constraint) => {
                if constraint.contains("email") {
                    AppError::Conflict("Email already in use!".to_string())
                } else if constraint.contains("username") {
                    AppError::Conflict("Username already in use!".to_string())
                } else {
                    tracing::debug!(%constraint, "unique constraint rejected write");
                    AppError::Conflict("Resource already exists".to_string())
                }
            }
            StoreError::ForeignKeyViolation(constraint) => {
                tracing::debug!(%constraint, "foreign key rejected write");
                AppError::NotFound("Referenced record not found".to_string())
            }
            StoreError::Database(e) => AppError::Internal(format!("Database error: {}", e)),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(format!("Password operation failed: {}", err))
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AppError::Unauthorized("Token expired".to_string()),
            TokenError::Create(msg) => AppError::Internal(format!("Token signing failed: {}", msg)),
            TokenError::Invalid(_) => AppError::Unauthorized("Invalid token".to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::Validation(details)
    }
}
