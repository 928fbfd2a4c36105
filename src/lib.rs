pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::ServiceConfig;
use crate::services::conversion::ConversionOrchestrator;
use crate::services::ingestion::IngestionService;
use crate::services::task_registry::TaskRegistry;
use crate::services::worker::ConversionWorker;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Headroom on top of the file size limit for multipart framing
pub const MULTIPART_OVERHEAD: usize = 10 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_to_json,
        api::handlers::status::get_task_status,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::UploadResponse,
            api::handlers::TaskStatusResponse,
            api::handlers::HealthResponse,
            api::handlers::ErrorResponse,
            models::TaskStatus,
        )
    ),
    tags(
        (name = "conversion", description = "Document upload and conversion status"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: ServiceConfig,
    pub registry: TaskRegistry,
    pub ingestion: IngestionService,
    pub worker: ConversionWorker,
}

impl AppState {
    /// Wires registry, conversion worker and ingestion service together.
    pub fn new(config: ServiceConfig) -> Self {
        let registry = TaskRegistry::new();
        let orchestrator =
            ConversionOrchestrator::new(registry.clone(), config.processed_dir.clone());
        let worker = ConversionWorker::new(orchestrator, config.max_concurrent_conversions);
        let ingestion = IngestionService::new(&config, registry.clone(), worker.clone());

        Self {
            config,
            registry,
            ingestion,
            worker,
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health_check))
        .route("/upload/to-json", post(api::handlers::upload_to_json))
        .route("/status/:task_id", get(api::handlers::get_task_status))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(DefaultBodyLimit::max(
            state.config.max_file_size + MULTIPART_OVERHEAD,
        ))
        .with_state(state)
}
