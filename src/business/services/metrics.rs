//! Prometheus 指标
//!
//! 全局注册表在首次访问时创建并注册所有指标。

use once_cell::sync::Lazy;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

const NAMESPACE: &str = "region_gateway";

/// /generate 请求结果计数（outcome: structured_data / error_fallback / rate_limited / saturated / invalid）
pub static REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new("requests_total", "Total generate requests by outcome").namespace(NAMESPACE),
        &["outcome"],
    )
    .expect("指标定义有效")
});

/// 地区解析结果计数（strategy: literal / fuzzy / span / none）
pub static REGION_MATCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new("region_matches_total", "Region resolutions by strategy").namespace(NAMESPACE),
        &["strategy"],
    )
    .expect("指标定义有效")
});

pub static BACKEND_ERRORS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    Counter::with_opts(
        Opts::new("backend_errors_total", "Failed inference endpoint calls").namespace(NAMESPACE),
    )
    .expect("指标定义有效")
});

pub static BACKEND_LATENCY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("backend_latency_seconds", "Inference backend latency in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("指标定义有效")
});

/// 当前占用的推理槽位
pub static GATE_IN_USE: Lazy<Gauge> = Lazy::new(|| {
    Gauge::with_opts(
        Opts::new("gate_slots_in_use", "Inference slots currently held").namespace(NAMESPACE),
    )
    .expect("指标定义有效")
});

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(REQUESTS_TOTAL.clone()),
        Box::new(REGION_MATCHES_TOTAL.clone()),
        Box::new(BACKEND_ERRORS_TOTAL.clone()),
        Box::new(BACKEND_LATENCY_SECONDS.clone()),
        Box::new(GATE_IN_USE.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            tracing::warn!("⚠️ 指标注册失败: {}", e);
        }
    }
    registry
});

/// 记录一次请求结果
pub fn record_outcome(outcome: &str) {
    REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// 记录一次地区解析结果
pub fn record_region_match(strategy: &str) {
    REGION_MATCHES_TOTAL.with_label_values(&[strategy]).inc();
}

/// 以 Prometheus 文本格式导出
pub fn render() -> String {
    TextEncoder::new()
        .encode_to_string(&REGISTRY.gather())
        .unwrap_or_else(|e| format!("# Error encoding metrics: {}", e))
}
