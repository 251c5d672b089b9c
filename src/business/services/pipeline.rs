//! 请求处理管线
//!
//! 单次 /generate 请求的生命周期：
//! RECEIVED → RATE_CHECKED → ENRICHED → GATE_ACQUIRED → BACKEND_CALLED → PARSED → DONE，
//! 限流或并发饱和时进入 REJECTED，输入无效时进入 ERROR。

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::concurrency_gate::ConcurrencyGate;
use super::inference::InferenceBackend;
use super::metrics;
use super::prompt_service::{SharedPromptService, SystemPromptService};
use super::rate_limit_service::{RateLimitResult, RateLimitService, SharedRateLimitService};
use super::region_resolver::RegionResolver;
use super::response_classifier::ResponseClassifier;
use crate::business::domain::{ChatMessage, Classification, RegionRecord};
use crate::infrastructure::config::Config;
use crate::shared::utils::sanitize_session_id;
use crate::shared::{AppError, AppResult, SessionId};

/// 管线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    RateChecked,
    Enriched,
    GateAcquired,
    BackendCalled,
    Parsed,
    Done,
    Rejected,
    Error,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "RECEIVED",
            PipelineStage::RateChecked => "RATE_CHECKED",
            PipelineStage::Enriched => "ENRICHED",
            PipelineStage::GateAcquired => "GATE_ACQUIRED",
            PipelineStage::BackendCalled => "BACKEND_CALLED",
            PipelineStage::Parsed => "PARSED",
            PipelineStage::Done => "DONE",
            PipelineStage::Rejected => "REJECTED",
            PipelineStage::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// 管线处理结果
#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub classification: Classification,
    pub session_id: SessionId,
    /// 命中的地区名称
    pub region: Option<String>,
}

/// 请求处理管线
pub struct GatewayPipeline {
    rate_limiter: SharedRateLimitService,
    gate: ConcurrencyGate,
    resolver: Arc<RegionResolver>,
    classifier: ResponseClassifier,
    backend: Arc<dyn InferenceBackend>,
    prompts: SharedPromptService,
}

impl GatewayPipeline {
    pub fn new(
        rate_limiter: SharedRateLimitService,
        gate: ConcurrencyGate,
        resolver: Arc<RegionResolver>,
        classifier: ResponseClassifier,
        backend: Arc<dyn InferenceBackend>,
        prompts: SharedPromptService,
    ) -> Self {
        Self {
            rate_limiter,
            gate,
            resolver,
            classifier,
            backend,
            prompts,
        }
    }

    /// 按配置组装各组件，并加载系统提示词
    pub async fn from_config(
        config: &Config,
        records: Vec<RegionRecord>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        let prompts = Arc::new(SystemPromptService::new(&config.prompt.system_prompt_path));
        prompts.initialize().await;

        Self::new(
            Arc::new(RateLimitService::new(&config.rate_limit)),
            ConcurrencyGate::new(config.backend.max_concurrent),
            Arc::new(RegionResolver::new(records, config.regions.similarity_threshold)),
            ResponseClassifier::new(config.classifier.clone()),
            backend,
            prompts,
        )
    }

    pub fn rate_limiter(&self) -> &SharedRateLimitService {
        &self.rate_limiter
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn resolver(&self) -> &RegionResolver {
        &self.resolver
    }

    pub fn prompts(&self) -> &SharedPromptService {
        &self.prompts
    }

    /// 处理一次请求
    ///
    /// `payload` 为请求体解析后的 JSON，无法解析时应传入 `Value::Null`。
    /// 限流检查先于任何输入校验。
    #[instrument(skip(self, payload), fields(client = %client_id))]
    pub async fn handle(&self, client_id: &str, payload: &Value) -> AppResult<GatewayReply> {
        transition(PipelineStage::Received);

        if let RateLimitResult::Exceeded { retry_after_seconds } =
            self.rate_limiter.check_rate_limit(client_id).await
        {
            transition(PipelineStage::Rejected);
            metrics::record_outcome("rate_limited");
            return Err(AppError::RateLimited { retry_after_seconds });
        }
        transition(PipelineStage::RateChecked);

        let prompt = match payload
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|prompt| !prompt.trim().is_empty())
        {
            Some(prompt) => prompt,
            None => {
                transition(PipelineStage::Error);
                metrics::record_outcome("invalid");
                return Err(crate::validation_error!(
                    "Entrada inválida: 'prompt' es requerido"
                ));
            }
        };

        let session_id = sanitize_session_id(payload.get("session_id").and_then(Value::as_str));
        debug!("🧾 会话ID: {}", session_id);

        let mut messages = vec![ChatMessage::system(self.prompts.current().await)];
        // 解析为纯计算，放到阻塞线程池执行，避免长文本占住异步工作线程
        let resolver = Arc::clone(&self.resolver);
        let query = prompt.to_string();
        let resolved = match tokio::task::spawn_blocking(move || resolver.resolve(&query)).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("⚠️ 地区解析任务异常终止，按未识别处理: {}", e);
                None
            }
        };
        let region = match resolved {
            Some(hit) => {
                metrics::record_region_match(hit.strategy.as_str());
                info!(
                    "📍 识别到地区: {} (策略: {})",
                    hit.record.display_name(),
                    hit.strategy.as_str()
                );
                messages.push(ChatMessage::system(context_message(&hit.record.context_block())));
                Some(hit.record.display_name().to_string())
            }
            None => {
                metrics::record_region_match("none");
                None
            }
        };
        messages.push(ChatMessage::user(prompt));
        transition(PipelineStage::Enriched);

        let permit = match self.gate.try_acquire() {
            Some(permit) => permit,
            None => {
                transition(PipelineStage::Rejected);
                metrics::record_outcome("saturated");
                return Err(AppError::Saturated);
            }
        };
        metrics::GATE_IN_USE.set(self.gate.in_use() as f64);
        transition(PipelineStage::GateAcquired);

        // 后端调用在独立任务中执行并持有槽位，客户端断开也会完整执行
        let backend = Arc::clone(&self.backend);
        let gate = self.gate.clone();
        let call = tokio::spawn(async move {
            let result = backend.chat(&messages).await;
            permit.release();
            metrics::GATE_IN_USE.set(gate.in_use() as f64);
            result
        });

        let raw_reply = match call.await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("⚠️ 推理后端不可用，错误信息交给分类器处理: {}", e);
                backend_error_text(e)
            }
            Err(e) => {
                error!("❌ 推理任务异常终止: {}", e);
                format!("Error interno del backend: {}", e)
            }
        };
        metrics::GATE_IN_USE.set(self.gate.in_use() as f64);
        transition(PipelineStage::BackendCalled);

        let classification = self.classifier.classify(&raw_reply);
        transition(PipelineStage::Parsed);

        metrics::record_outcome(classification.reply_kind().as_str());
        transition(PipelineStage::Done);

        Ok(GatewayReply {
            classification,
            session_id,
            region,
        })
    }
}

/// 地区上下文系统消息
fn context_message(block: &str) -> String {
    format!(
        "Contexto municipal:\n\n\n📍 *Información del municipio detectado:*\n{}\n\n",
        block
    )
}

fn transition(stage: PipelineStage) {
    debug!("🔄 管线阶段: {}", stage);
}

/// 后端错误转为文本，作为模型输出交给分类器
fn backend_error_text(error: AppError) -> String {
    match error {
        AppError::ExternalService(message) => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::{ClassifierConfig, RateLimitConfig};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::{Mutex, Notify};

    /// 返回固定回复并记录收到的消息
    struct StubBackend {
        reply: Result<String, String>,
        received: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl StubBackend {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                received: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                received: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InferenceBackend for StubBackend {
        async fn chat(&self, messages: &[ChatMessage]) -> AppResult<String> {
            self.received.lock().await.push(messages.to_vec());
            self.reply.clone().map_err(AppError::ExternalService)
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    /// 阻塞直到收到通知
    struct BlockingBackend {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl InferenceBackend for BlockingBackend {
        async fn chat(&self, _messages: &[ChatMessage]) -> AppResult<String> {
            self.release.notified().await;
            Ok(r#"{"classification":"X"}"#.to_string())
        }

        fn name(&self) -> &str {
            "blocking"
        }
    }

    fn pipeline_with(
        backend: Arc<dyn InferenceBackend>,
        burst: u32,
        max_concurrent: usize,
    ) -> GatewayPipeline {
        let rate_config = RateLimitConfig {
            requests_per_minute: 30,
            burst,
            ..RateLimitConfig::default()
        };
        let records = vec![RegionRecord::new(vec![
            ("MUNICIPIO", "La Plata"),
            ("LOCALIDADES", "City Bell, Tolosa"),
            ("DIRECCION", "Calle 7 N° 1234"),
        ])];

        GatewayPipeline::new(
            Arc::new(RateLimitService::new(&rate_config)),
            ConcurrencyGate::new(max_concurrent),
            Arc::new(RegionResolver::new(records, 0.85)),
            ResponseClassifier::new(ClassifierConfig::default()),
            backend,
            Arc::new(SystemPromptService::new("/nonexistent/system_prompt.txt")),
        )
    }

    #[tokio::test]
    async fn test_prose_reply_without_region_falls_back() {
        let backend = StubBackend::replying("Claro, con gusto le ayudo.");
        let pipeline = pipeline_with(backend.clone(), 10, 4);

        let reply = pipeline
            .handle("10.0.0.1", &json!({"prompt": "El aire acondicionado del quirófano falla, es urgente"}))
            .await
            .unwrap();

        assert!(reply.classification.is_fallback());
        assert_eq!(
            reply.classification.content().get("classification"),
            Some(&json!("MODEL_ERROR"))
        );
        assert!(reply.region.is_none());

        let received = backend.received.lock().await;
        assert_eq!(received[0].len(), 2, "无地区时只有系统提示词和用户消息");
    }

    #[tokio::test]
    async fn test_structured_reply_with_region_context() {
        let backend = StubBackend::replying(r#"{"classification":"Tramite","urgency":"2"}"#);
        let pipeline = pipeline_with(backend.clone(), 10, 4);

        let reply = pipeline
            .handle("10.0.0.1", &json!({"prompt": "Vivo en Tolosa", "session_id": "ABC-123"}))
            .await
            .unwrap();

        assert!(!reply.classification.is_fallback());
        assert_eq!(reply.session_id, "abc-123");
        assert_eq!(reply.region.as_deref(), Some("La Plata"));

        let received = backend.received.lock().await;
        let messages = &received[0];
        assert_eq!(messages.len(), 3);
        assert!(messages[1]
            .content
            .starts_with("Contexto municipal:\n\n\n📍 *Información del municipio detectado:*\n"));
        assert!(messages[1].content.ends_with("\n\n"));
        assert!(messages[1].content.contains("Calle 7 N° 1234"));
        assert_eq!(messages[2], ChatMessage::user("Vivo en Tolosa"));
    }

    #[tokio::test]
    async fn test_invalid_prompt_rejected_after_rate_check() {
        let pipeline = pipeline_with(StubBackend::replying("{}"), 1, 4);

        let error = pipeline.handle("10.0.0.2", &json!({"prompt": "   "})).await.unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));

        // 无效请求同样消耗令牌
        let error = pipeline.handle("10.0.0.2", &json!({"prompt": "hola"})).await.unwrap_err();
        assert!(matches!(error, AppError::RateLimited { .. }));

        let error = pipeline.handle("10.0.0.3", &Value::Null).await.unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_invalid_session_id_replaced() {
        let pipeline = pipeline_with(StubBackend::replying("{}"), 10, 4);
        let reply = pipeline
            .handle("10.0.0.4", &json!({"prompt": "hola", "session_id": "no válido!"}))
            .await
            .unwrap();
        assert_eq!(reply.session_id.len(), 36);
        assert!(uuid::Uuid::parse_str(&reply.session_id).is_ok());
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_fallback() {
        let backend = StubBackend::failing(
            "No se pudo obtener respuesta del backend. Último error: connection refused",
        );
        let pipeline = pipeline_with(backend, 10, 4);

        let reply = pipeline.handle("10.0.0.5", &json!({"prompt": "hola"})).await.unwrap();
        assert!(reply.classification.is_fallback());
        let message = reply
            .classification
            .content()
            .get("extended_response")
            .and_then(Value::as_str)
            .unwrap();
        assert!(message.contains("No se pudo obtener respuesta del backend"));
        assert_eq!(pipeline.gate().available(), 4, "出错后槽位应归还");
    }

    #[tokio::test]
    async fn test_saturated_gate_rejects_immediately() {
        let release = Arc::new(Notify::new());
        let backend = Arc::new(BlockingBackend {
            release: release.clone(),
        });
        let pipeline = Arc::new(pipeline_with(backend, 10, 1));

        let first = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.handle("10.0.0.6", &json!({"prompt": "uno"})).await })
        };

        while pipeline.gate().available() > 0 {
            tokio::task::yield_now().await;
        }

        let error = pipeline.handle("10.0.0.7", &json!({"prompt": "dos"})).await.unwrap_err();
        assert!(matches!(error, AppError::Saturated));

        release.notify_one();
        let reply = first.await.unwrap().unwrap();
        assert!(!reply.classification.is_fallback());
        assert_eq!(pipeline.gate().available(), 1);
    }

    #[tokio::test]
    async fn test_backend_call_completes_after_caller_dropped() {
        let release = Arc::new(Notify::new());
        let backend = Arc::new(BlockingBackend {
            release: release.clone(),
        });
        let pipeline = Arc::new(pipeline_with(backend, 10, 1));

        let caller = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.handle("10.0.0.8", &json!({"prompt": "uno"})).await })
        };
        while pipeline.gate().available() > 0 {
            tokio::task::yield_now().await;
        }

        // 模拟客户端断开
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        assert_eq!(pipeline.gate().available(), 0, "后端调用仍在进行，槽位保持占用");

        release.notify_one();
        while pipeline.gate().available() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(pipeline.gate().available(), 1);
    }

    #[tokio::test]
    async fn test_large_prompt_does_not_stall_runtime() {
        let backend = StubBackend::replying(r#"{"classification":"Tramite"}"#);
        let pipeline = pipeline_with(backend, 10, 4);

        let mut prompt = "necesito ayuda con un tramite urgente por favor ".repeat(2_100);
        prompt.push_str("vivo en tolosa");

        let reply = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            pipeline.handle("10.0.0.9", &json!({ "prompt": prompt })),
        )
        .await
        .expect("长文本请求应在时限内完成")
        .unwrap();
        assert_eq!(reply.region.as_deref(), Some("La Plata"));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::GateAcquired.to_string(), "GATE_ACQUIRED");
        assert_eq!(PipelineStage::Rejected.to_string(), "REJECTED");
    }
}
