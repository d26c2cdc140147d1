//! Error type shared by all handlers, rendered as `{"error": ...}` JSON.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::models::ValidationError;
use crate::status::UnknownStatusError;

// ---

#[derive(Debug, Error)]
pub enum ApiError {
    // ---
    /// Request body or path that failed to extract.
    #[error("{message}")]
    BadRequest { status: StatusCode, message: String },

    #[error("Field not found")]
    FieldNotFound,

    #[error("Crop category not found")]
    CropNotFound,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatusError),

    #[error("Sensor feed is not configured")]
    FeedNotConfigured,

    #[error("Failed to fetch sensor data: {0}")]
    Feed(#[from] reqwest::Error),

    #[error("Internal server error")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        // ---
        match self {
            ApiError::BadRequest { status, .. } => *status,
            ApiError::FieldNotFound | ApiError::CropNotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::UnknownStatus(_) => StatusCode::BAD_REQUEST,
            ApiError::FeedNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Feed(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status_code();

        let body = match &self {
            ApiError::Validation(e) => json!({
                "error": "Validation error",
                "details": e.details,
            }),
            ApiError::Database(e) => {
                error!("Database error: {}", e);
                json!({ "error": self.to_string() })
            }
            ApiError::Feed(e) => {
                error!("Sensor feed error: {}", e);
                json!({ "error": self.to_string() })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_status_codes() {
        // ---
        assert_eq!(ApiError::FieldNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::FeedNotConfigured.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(UnknownStatusError("dry".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rejection_keeps_its_status() {
        // ---
        let err = ApiError::BadRequest {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "missing field `salinity`".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.to_string(), "missing field `salinity`");
    }

    #[test]
    fn test_validation_response() {
        // ---
        let err = ValidationError {
            details: vec!["Area must be at least 0.1 hectares".to_string()],
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_messages() {
        // ---
        assert_eq!(
            ApiError::from(UnknownStatusError("dry".into())).to_string(),
            "unknown field status 'dry'"
        );
        // database details stay in the log
        assert_eq!(
            ApiError::from(sqlx::Error::RowNotFound).to_string(),
            "Internal server error"
        );
    }
}
