//! 业务服务模块
//!
//! 准入控制、地区解析、回复分类与请求管线

pub mod concurrency_gate;
pub mod inference;
pub mod metrics;
pub mod pipeline;
pub mod prompt_service;
pub mod rate_limit_service;
pub mod region_resolver;
pub mod response_classifier;

pub use concurrency_gate::{ConcurrencyGate, GatePermit};
pub use inference::{InferenceBackend, OllamaClient};
pub use pipeline::{GatewayPipeline, GatewayReply, PipelineStage};
pub use prompt_service::{SharedPromptService, SystemPromptService};
pub use rate_limit_service::{RateLimitResult, RateLimitService, SharedRateLimitService};
pub use region_resolver::{MatchStrategy, RegionMatch, RegionResolver};
pub use response_classifier::ResponseClassifier;
