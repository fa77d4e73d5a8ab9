use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Meme Generator API",
        description = "Burns top and bottom captions into uploaded images"
    ),
    paths(
        crate::handlers::meme::generate_meme,
        crate::handlers::meme::health_check,
        crate::handlers::meme::get_metrics
    ),
    components(
        schemas(
            crate::models::meme::MemeUploadForm,
            crate::models::meme::HealthResponse,
            crate::models::meme::ErrorBody
        )
    ),
    tags(
        (name = "memes", description = "Meme generation"),
        (name = "health", description = "Liveness"),
        (name = "monitoring", description = "Prometheus metrics")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
