use crate::handlers::validation::ValidationError;
use crate::storage::StorageError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Every failure a route can report, mapped onto 400 / 404 / 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match self {
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                "appointment storage is unavailable".to_string()
            }
            other => {
                tracing::warn!(status = status.as_u16(), "{}", other);
                other.to_string()
            }
        };

        HttpResponse::build(status).json(json!({
            "error": message,
            "status": status.as_u16(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[actix_web::test]
    async fn storage_errors_hide_details() {
        let err = ApiError::from(StorageError::io(
            PathBuf::from("/secret/citas.json"),
            std::io::Error::other("disk on fire"),
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = actix_web::body::to_bytes(err.error_response().into_body())
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("secret"));
        assert!(text.contains("500"));
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let err = ApiError::from(ValidationError::InvalidCedula);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
