//! 路由配置模块
//!
//! 组织和配置所有HTTP路由

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

use crate::business::services::GatewayPipeline;
use crate::infrastructure::Config;
use crate::presentation::handlers;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline'; \
    style-src 'self' 'unsafe-inline'; \
    img-src 'self' data: https:; \
    font-src 'self' data:; \
    connect-src 'self'; \
    object-src 'none'; \
    base-uri 'self'; \
    frame-ancestors 'none'; \
    form-action 'self'";

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<GatewayPipeline>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pipeline: Arc<GatewayPipeline>, config: Arc<Config>) -> Self {
        Self { pipeline, config }
    }
}

/// 创建应用路由
pub fn create_routes(state: AppState) -> Router {
    let max_content_length = state.config.server.max_content_length;
    let static_dir = state.config.server.static_dir.clone();

    let api_routes = Router::new()
        .route("/generate", post(handlers::generate::generate))
        .route("/get_prompt", get(handlers::prompt::get_prompt))
        .route("/save_prompt", post(handlers::prompt::save_prompt))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::prometheus_metrics));

    let app = match static_dir {
        Some(dir) if std::path::Path::new(&dir).exists() => {
            tracing::info!("🌐 静态文件目录: {}", dir);
            api_routes.fallback_service(ServeDir::new(&dir).append_index_html_on_directories(true))
        }
        Some(dir) => {
            tracing::warn!("⚠️ 静态文件目录不存在，仅提供 API 服务: {}", dir);
            api_routes
        }
        None => {
            tracing::info!("🔧 仅提供 API 服务");
            api_routes
        }
    };

    app.with_state(state)
        .layer(DefaultBodyLimit::max(max_content_length))
        .layer(security_header(header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY))
        .layer(security_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(security_header(header::X_FRAME_OPTIONS, "DENY"))
        .layer(security_header(header::REFERRER_POLICY, "same-origin"))
        .layer(security_header(
            HeaderName::from_static("permissions-policy"),
            "geolocation=(), camera=(), microphone=()",
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// 响应中缺少该头部时补上
fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}
