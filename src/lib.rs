//! Meme generator: an HTTP service that burns top/bottom captions into uploaded images,
//! plus the client used to drive it.

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{OnResponse, TraceLayer},
};
use tracing::{info, Level, Span};

pub mod client;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod openapi;
pub mod services;
pub mod utils;

use crate::config::Config;
use crate::services::meme::MemeService;

/// Room left for the caption fields and multipart framing on top of the image limit.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
struct LogOnResponse;

impl<B> OnResponse<B> for LogOnResponse {
    fn on_response(self, response: &axum::response::Response<B>, latency: Duration, span: &Span) {
        info!(parent: span,
            status = %response.status(),
            latency = ?latency,
            "response sent"
        );
    }
}

pub fn build_router(config: Arc<Config>, service: Arc<MemeService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = config.upload.max_bytes + FORM_OVERHEAD_BYTES;
    let timeout = Duration::from_secs(config.server.request_timeout_secs);
    let proxy = config.server.proxy.clone();

    Router::new()
        .route("/api/generate-meme", post(handlers::meme::generate_meme))
        .route("/api/health", get(handlers::meme::health_check))
        .route("/metrics", get(handlers::meme::get_metrics))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &axum::http::Request<_>| {
                    let remote_addr = if proxy.enabled {
                        request
                            .headers()
                            .get(&proxy.ip_header)
                            .and_then(|h| h.to_str().ok())
                            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
                            .unwrap_or_else(|| "unknown".to_string())
                    } else {
                        request
                            .extensions()
                            .get::<ConnectInfo<SocketAddr>>()
                            .map(|ci| ci.0.ip().to_string())
                            .unwrap_or_else(|| "unknown".to_string())
                    };

                    tracing::span!(
                        Level::INFO,
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        ip = %remote_addr,
                    )
                })
                .on_response(LogOnResponse),
        )
        .layer(cors)
        .with_state(service)
}
