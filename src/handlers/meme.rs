use axum::{
    extract::{multipart::MultipartError, multipart::MultipartRejection, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::metrics::{FAILURE_COUNTER, REQUEST_COUNTER, RESPONSE_TIME};
use crate::models::meme::{ErrorBody, HealthResponse, MemeRequest, MemeUploadForm, Upload};
use crate::services::meme::MemeService;
use crate::utils::error::{AppError, Result};

/// Generate a meme
///
/// Overlays the uppercased captions on the uploaded image and returns it as JPEG.
#[utoipa::path(
    post,
    path = "/api/generate-meme",
    tag = "memes",
    request_body(content = MemeUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Captioned image", content_type = "image/jpeg"),
        (status = 400, description = "Missing image, missing captions or unsupported type", body = ErrorBody),
        (status = 413, description = "Image larger than the upload limit", body = ErrorBody),
        (status = 500, description = "Composition failed", body = ErrorBody)
    )
)]
pub async fn generate_meme(
    State(service): State<Arc<MemeService>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    REQUEST_COUNTER.inc();
    let _timer = crate::metrics::Timer::new(&RESPONSE_TIME);

    // A body that is not multipart at all carries no file.
    let Ok(multipart) = multipart else {
        FAILURE_COUNTER.with_label_values(&["missing_image"]).inc();
        return Err(AppError::MissingImage);
    };

    let request = read_meme_form(&service, multipart).await?;
    info!(
        filename = request.image.filename.as_deref().unwrap_or("unknown"),
        mime_type = %request.image.mime_type,
        size_bytes = request.image.bytes.len(),
        "generating meme"
    );

    let jpeg = service.generate(request).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

async fn read_meme_form(service: &MemeService, mut multipart: Multipart) -> Result<MemeRequest> {
    let mut image = None;
    let mut top_text = String::new();
    let mut bottom_text = String::new();

    let limit = service.max_upload_bytes();
    let to_app_error = |err| multipart_error(err, limit);

    while let Some(field) = multipart.next_field().await.map_err(to_app_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                if image.is_some() {
                    FAILURE_COUNTER.with_label_values(&["duplicate_image"]).inc();
                    return Err(AppError::Multipart(
                        "only one image part is accepted".to_string(),
                    ));
                }

                let filename = field.file_name().map(str::to_string);
                let mime_type = field
                    .content_type()
                    .map(str::to_string)
                    .or_else(|| {
                        filename
                            .as_deref()
                            .and_then(|name| mime_guess::from_path(name).first())
                            .map(|m| m.essence_str().to_string())
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                service.check_mime_type(&mime_type)?;

                let bytes = field.bytes().await.map_err(to_app_error)?;
                service.check_size(bytes.len())?;

                image = Some(Upload {
                    bytes,
                    mime_type,
                    filename,
                });
            }
            Some("topText") => top_text = field.text().await.map_err(to_app_error)?,
            Some("bottomText") => bottom_text = field.text().await.map_err(to_app_error)?,
            other => {
                warn!(field = ?other, "ignoring unexpected form field");
            }
        }
    }

    let Some(image) = image else {
        FAILURE_COUNTER.with_label_values(&["missing_image"]).inc();
        return Err(AppError::MissingImage);
    };

    Ok(MemeRequest {
        image,
        top_text,
        bottom_text,
    })
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    // The body limit layer trips before the whole field is buffered.
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        FAILURE_COUNTER.with_label_values(&["too_large"]).inc();
        AppError::PayloadTooLarge { limit }
    } else {
        FAILURE_COUNTER.with_label_values(&["bad_multipart"]).inc();
        AppError::Multipart(err.body_text())
    }
}

/// Health check
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Prometheus metrics
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "monitoring",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain")
    )
)]
pub async fn get_metrics() -> Result<impl IntoResponse> {
    let metrics = crate::metrics::get_metrics()?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        metrics,
    ))
}
