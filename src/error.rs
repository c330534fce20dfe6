use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Donation target not found: {0}")]
    TargetNotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Payment processor error: {0}")]
    Processor(String),

    /// The external checkout session was created but the local record
    /// could not be written. The external session id is carried so the
    /// gap stays observable in logs and can be reconciled out of band.
    #[error("Reconciliation gap for external session {external_session_id}: {source}")]
    ReconciliationGap {
        external_session_id: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            AppError::InvalidAmount(msg) => {
                (StatusCode::BAD_REQUEST, "Invalid amount", Some(msg.clone()))
            }
            AppError::TargetNotFound(msg) => (
                StatusCode::NOT_FOUND,
                "Donation target not found",
                Some(msg.clone()),
            ),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Processor(msg) => {
                tracing::error!("Payment processor error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Payment processor error",
                    None,
                )
            }
            AppError::ReconciliationGap {
                external_session_id,
                source,
            } => {
                // Logged distinctly from plain database errors: the external
                // session exists without a local counterpart and must be
                // reconciled out of band, never retried automatically.
                tracing::error!(
                    "Reconciliation gap: external session {} has no local record ({})",
                    external_session_id,
                    source
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Extension for converting `Option<T>` lookups into typed not-found errors.
pub trait OptionExt<T> {
    fn or_not_found(self, what: &str) -> Result<T>;
    fn or_target_not_found(self, what: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, what: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(what.to_string()))
    }

    fn or_target_not_found(self, what: &str) -> Result<T> {
        self.ok_or_else(|| AppError::TargetNotFound(what.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
