//! HTTP serving layer for MediGuard.
//!
//! Maps pipeline runs onto a small REST surface: a health check, a subject
//! listing and the analysis endpoint under `/v1`.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use mediguard_config::AppConfig;
use mediguard_core::record::RecordStore;
use mediguard_pipeline::Pipeline;
use mediguard_records::InMemoryRecordStore;

/// Frontend origin allowed by CORS.
const ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Request body limit.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state: the immutable pipeline plus its record store.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        let store = pipeline.store().clone();
        Self {
            pipeline: Arc::new(pipeline),
            store,
        }
    }

    /// Assemble store, tools, reasoner and pipeline from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, BoxError> {
        let store: Arc<dyn RecordStore> =
            Arc::new(InMemoryRecordStore::load_json(&config.data.records_path)?);

        let tools = mediguard_tools::default_registry(store.clone());
        let reasoner = mediguard_providers::build_from_config(&config.reasoner)?;
        let pipeline = Pipeline::from_config(&config.pipeline, tools, store, reasoner)?;
        info!(
            stages = ?pipeline.stage_names(),
            max_retries = config.pipeline.max_retries,
            "Pipeline built"
        );

        Ok(Self::new(pipeline))
    }
}

/// Build the full router.
///
/// Layers applied:
/// - CORS restricted to the frontend origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([HeaderValue::from_static(ALLOWED_ORIGIN)]))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the HTTP server and serve until the process exits.
pub async fn start(config: AppConfig) -> Result<(), BoxError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = AppState::from_config(&config)?;
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(api_v1::tests::test_state(&[]));

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn cors_allows_frontend_origin_only() {
        let preflight = |origin: &'static str| {
            Request::builder()
                .method("OPTIONS")
                .uri("/v1/analyze")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap()
        };

        let app = build_router(api_v1::tests::test_state(&[]));
        let response = app.oneshot(preflight(ALLOWED_ORIGIN)).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static(ALLOWED_ORIGIN))
        );

        let app = build_router(api_v1::tests::test_state(&[]));
        let response = app.oneshot(preflight("http://evil.example")).await.unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn from_config_reports_missing_snapshot() {
        let mut config = AppConfig::default();
        config.data.records_path = "/nonexistent/mediguard/records.json".into();
        let err = AppState::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("records.json"));
    }
}
