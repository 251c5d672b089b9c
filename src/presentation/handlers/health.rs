//! 健康检查与指标处理器

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
};
use tracing::{debug, instrument};

use crate::business::services::metrics;
use crate::presentation::dto::HealthResponse;
use crate::presentation::routes::AppState;

/// GET /health
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("🏥 健康检查请求");

    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        regions_loaded: state.pipeline.resolver().len(),
        gate_available: state.pipeline.gate().available(),
    })
}

/// GET /metrics
pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        metrics::render(),
    )
}
