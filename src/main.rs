//! 地区分类网关服务主入口

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use region_gateway::business::services::InferenceBackend;
use region_gateway::{create_routes, load_reference_data, AppState, Config, GatewayPipeline, OllamaClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志 - 默认INFO等级
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "region_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载环境变量
    dotenv::dotenv().ok();

    info!("🚀 启动地区分类网关服务");

    // 加载配置
    let config = Arc::new(Config::load()?);
    info!("✅ 配置加载成功");

    // 加载地区参考数据
    let records = match load_reference_data(&config.regions).await {
        Ok(records) => records,
        Err(e) => {
            warn!("⚠️ 地区参考数据加载失败，地区识别不可用: {}", e);
            Vec::new()
        }
    };

    // 初始化推理后端
    let backend: Arc<dyn InferenceBackend> = Arc::new(OllamaClient::new(&config.backend)?);

    // 组装请求管线
    let pipeline = Arc::new(GatewayPipeline::from_config(&config, records, backend).await);
    info!(
        "✅ 请求管线就绪: 限流 {}/分钟 (突发 {}), 推理并发上限 {}",
        config.rate_limit.requests_per_minute,
        config.rate_limit.burst,
        config.backend.max_concurrent
    );

    // 定期清理空闲令牌桶
    let rate_limiter = pipeline.rate_limiter().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(rate_limiter.full_refill_duration());
        interval.tick().await;
        loop {
            interval.tick().await;
            rate_limiter.cleanup_idle_buckets().await;
        }
    });

    // 创建路由
    let app = create_routes(AppState::new(pipeline, config.clone()));
    info!("✅ 路由创建成功");

    // 启动服务器
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!("🌐 服务器启动成功，监听地址: {}", address);
    info!("📖 健康检查: http://localhost:{}/health", config.server.port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 接收到关闭信号，正在优雅关闭服务器...");
    })
    .await?;

    Ok(())
}
