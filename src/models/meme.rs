use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Image part of a generation request, exactly as received.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Bytes,
    pub mime_type: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MemeRequest {
    pub image: Upload,
    pub top_text: String,
    pub bottom_text: String,
}

/// Multipart form accepted by `POST /api/generate-meme`. Only used for the API document.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemeUploadForm {
    /// JPEG, PNG or WebP, at most 10MB
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
    #[schema(example = "one does not simply")]
    pub top_text: Option<String>,
    #[schema(example = "write a meme generator")]
    pub bottom_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "OK")]
    pub status: String,
    #[schema(example = "Meme Generator API is running")]
    pub message: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            message: "Meme Generator API is running".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "No image file provided")]
    pub error: String,
}
