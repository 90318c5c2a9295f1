use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::db::models::DonationStatus;
use crate::db::DbError;
use crate::points::InsufficientPoints;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Donation is {0}")]
    InvalidTransition(DonationStatus),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error(transparent)]
    InsufficientPoints(#[from] InsufficientPoints),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        AppError::Validation { field, reason: reason.into() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Validation { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidTransition(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::InsufficientPoints(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Upstream(detail) => {
                tracing::error!("Upstream error: {}", detail);
                (StatusCode::BAD_GATEWAY, "Upstream API error".to_string())
            }
            AppError::Database(e) => {
                tracing::error!("DB Error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database Error".to_string())
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
