use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::meme::ErrorBody;
use crate::services::compositor::CompositionError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("No image file provided")]
    MissingImage,

    #[error("Please provide at least one text field")]
    MissingCaption,

    #[error("Text fields must be at most {max} characters")]
    CaptionTooLong { max: usize },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("Invalid multipart payload: {0}")]
    Multipart(String),

    #[error("Composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingImage
            | AppError::MissingCaption
            | AppError::CaptionTooLong { .. }
            | AppError::UnsupportedMediaType(_)
            | AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Composition(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message sent to the client. Server-side failures never leak their detail.
    pub fn public_message(&self) -> String {
        match self {
            AppError::MissingImage | AppError::MissingCaption | AppError::CaptionTooLong { .. } => {
                self.to_string()
            }
            AppError::UnsupportedMediaType(_) => {
                "Invalid file type. Only JPEG, PNG, and WebP are allowed.".to_string()
            }
            AppError::PayloadTooLarge { .. } => "File too large".to_string(),
            AppError::Multipart(_) => "Invalid multipart payload".to_string(),
            AppError::Composition(_) => "Failed to generate meme".to_string(),
            AppError::Config(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.public_message(),
        });

        (self.status(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_keep_their_wording() {
        let (status, body) = body_json(AppError::MissingImage).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "No image file provided" }));

        let (status, body) = body_json(AppError::MissingCaption).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            serde_json::json!({ "error": "Please provide at least one text field" })
        );

        let (_, body) = body_json(AppError::CaptionTooLong { max: 100 }).await;
        assert_eq!(body["error"], "Text fields must be at most 100 characters");
    }

    #[tokio::test]
    async fn internal_detail_is_hidden() {
        let err = AppError::Composition(CompositionError::Canvas {
            width: 0,
            height: 0,
        });
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "error": "Failed to generate meme" }));

        let (_, body) = body_json(AppError::Internal("secret path /srv/x".into())).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn oversize_maps_to_413() {
        let err = AppError::PayloadTooLarge { limit: 10 };
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.public_message(), "File too large");
    }
}
