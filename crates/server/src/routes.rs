use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use executor::{ExecutionRequest, ExecutionResponse, Executor};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub mode: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub fn router(executor: Arc<Executor>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/execute", post(execute))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(executor)
}

/// Service identity and mode. Carries no execution semantics.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "code-executor",
        mode: "subprocess",
        timestamp: chrono::Utc::now(),
    })
}

/// Run one snippet. The executor never fails at this boundary, so the
/// caller always gets a well-formed response; malformed request bodies are
/// rejected by the JSON extractor before we get here.
async fn execute(
    State(executor): State<Arc<Executor>>,
    Json(request): Json<ExecutionRequest>,
) -> Json<ExecutionResponse> {
    Json(executor.execute(&request).await)
}
