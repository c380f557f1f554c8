//! API error responses
//!
//! Every error renders as `{"error": {"type", "message", "request_id"}}`
//! with the matching HTTP status, so clients can branch on `type` without
//! parsing messages.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Client-visible API failures.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Créditos insuficientes para realizar a análise")]
    InsufficientCredits,

    #[error("análise já existe: {0}")]
    DuplicateId(String),

    #[error("análise não encontrada: {0}")]
    NotFound(String),

    #[error("resultado ainda não disponível para: {0}")]
    NotReady(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            ApiError::DuplicateId(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotReady(_) => StatusCode::CONFLICT,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::InsufficientCredits => "insufficient_credits",
            ApiError::DuplicateId(_) => "duplicate_id",
            ApiError::NotFound(_) => "not_found",
            ApiError::NotReady(_) => "not_ready",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let body = serde_json::json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
                "request_id": request_id,
            }
        });
        (self.status(), Json(body)).into_response()
    }
}
