use crate::app::services::Services;
use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use hyper::Server;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Body of every trigger response.
#[derive(Debug, Serialize)]
pub struct TriggerResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> TriggerResponse<T> {
    fn completed(message: String, summary: T) -> Self {
        Self { success: true, message, summary: Some(summary), error: None }
    }

    fn failed(what: &str, err: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            message: format!("{what} failed"),
            summary: None,
            error: Some(err.to_string()),
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "duende-scraper",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Runs are spawned so a client that hangs up does not cancel them midway.
/// Completed runs answer 200 even with zero new events; only fatal errors
/// (store failures) reach the 500 branch.
async fn trigger_run(Extension(services): Extension<Arc<Services>>) -> Response {
    let run = tokio::spawn(async move { services.refresh.run().await });
    match run.await {
        Ok(Ok(summary)) => (StatusCode::OK, Json(TriggerResponse::completed(summary.message(), summary))).into_response(),
        Ok(Err(e)) => {
            error!("Refresh run failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(TriggerResponse::<()>::failed("refresh run", e))).into_response()
        }
        Err(e) => {
            error!("Refresh run task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(TriggerResponse::<()>::failed("refresh run", e))).into_response()
        }
    }
}

async fn trigger_discovery(Extension(services): Extension<Arc<Services>>) -> Response {
    let run = tokio::spawn(async move { services.discovery.run().await });
    match run.await {
        Ok(Ok(summary)) => (StatusCode::OK, Json(TriggerResponse::completed(summary.message(), summary))).into_response(),
        Ok(Err(e)) => {
            error!("Discovery run failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(TriggerResponse::<()>::failed("discovery run", e))).into_response()
        }
        Err(e) => {
            error!("Discovery run task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(TriggerResponse::<()>::failed("discovery run", e))).into_response()
        }
    }
}

/// Create the HTTP router with health and trigger routes.
pub fn create_server(services: Arc<Services>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/run", get(trigger_run).post(trigger_run))
        .route("/api/discover", get(trigger_discovery).post(trigger_discovery))
        .layer(Extension(services))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(services: Arc<Services>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(services);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP trigger listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}
