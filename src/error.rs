//! Central error type and HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Error surfaced by the substrate HTTP client.
#[derive(Debug, Error, Clone)]
pub enum SubstrateError {
    #[error("substrate returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("substrate request transport failure: {0}")]
    Transport(String),

    #[error("circuit breaker open")]
    CircuitOpen,
}

impl SubstrateError {
    /// `retryable ⇔ status ∈ {408, 429, 5xx} ∨ transport failure`.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubstrateError::Http { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            SubstrateError::Transport(_) => true,
            SubstrateError::CircuitOpen => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("pool error: {0}")]
    Pool(String),
    #[error("query error: {0}")]
    Query(#[from] tokio_postgres::Error),
    #[error("row not found")]
    NotFound,
}

impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        DatabaseError::Pool(e.to_string())
    }
}

/// The error kinds the HTTP layer maps to status codes.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("permission denied: {message}")]
    PermissionDenied {
        message: String,
        cap: u32,
        count: u32,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("substrate unavailable: {0}")]
    SubstrateUnavailable(#[from] SubstrateError),

    #[error("llm transient failure: {0}")]
    LlmTransient(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },
    #[error("provider {provider} timed out")]
    Timeout { provider: String },
    #[error("provider {provider} rate limited")]
    RateLimited { provider: String },
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::AuthRequired => "auth_required",
            AppError::PermissionDenied { .. } => "permission_denied",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::SubstrateUnavailable(_) => "substrate_unavailable",
            AppError::LlmTransient(_) => "llm_transient",
            AppError::Cancelled => "cancelled",
            AppError::Internal(_) => "internal",
            AppError::Database(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AuthRequired => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::SubstrateUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::LlmTransient(_) => StatusCode::BAD_GATEWAY,
            AppError::Cancelled => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            AppError::PermissionDenied { cap, count, .. } => {
                Some(json!({"cap": cap, "count": count}))
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                None
            }
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
