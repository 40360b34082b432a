pub mod api;
pub mod config;
pub mod models;
pub mod services;

use crate::config::AppConfig;
use crate::services::orchestrator::UploadOrchestrator;
use crate::services::staging::UploadStager;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::upload::UploadResponse,
            api::handlers::health::HealthResponse,
            api::error::ErrorResponse,
            models::ManagedFileRecord,
            models::UserError,
        )
    ),
    tags(
        (name = "upload", description = "Upload files into the Shopify content library"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<UploadOrchestrator>,
    pub stager: Arc<UploadStager>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = match state.config.max_upload_size {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/upload",
            post(api::handlers::upload::upload_file).layer(body_limit),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
