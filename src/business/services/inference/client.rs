//! Ollama 对话客户端
//!
//! 多个端点按轮询顺序尝试，某个端点失败时继续下一个。

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use super::traits::InferenceBackend;
use crate::business::domain::ChatMessage;
use crate::business::services::metrics;
use crate::infrastructure::config::BackendConfig;
use crate::shared::constants::backend::CHAT_PATH;
use crate::shared::{AppError, AppResult};

/// 发送给 /api/chat 的请求体
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    format: &'a str,
}

/// Ollama 客户端
#[derive(Debug)]
pub struct OllamaClient {
    client: Client,
    endpoints: Vec<String>,
    model: String,
    cursor: AtomicUsize,
}

impl OllamaClient {
    pub fn new(config: &BackendConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                error!("❌ 创建HTTP客户端失败: {}", e);
                AppError::Configuration(format!("创建HTTP客户端失败: {}", e))
            })?;

        let endpoints: Vec<String> = config
            .endpoints
            .iter()
            .map(|endpoint| endpoint.trim_end_matches('/').to_string())
            .collect();

        info!(
            "🔗 推理后端客户端就绪: 模型 {}, 端点 {:?}, 超时 {}s",
            config.model, endpoints, config.timeout_seconds
        );

        Ok(Self {
            client,
            endpoints,
            model: config.model.clone(),
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 向单个端点发送请求
    async fn call_endpoint(&self, endpoint: &str, messages: &[ChatMessage]) -> AppResult<String> {
        let url = format!("{}{}", endpoint, CHAT_PATH);
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            format: "json",
        };

        debug!("📤 发送对话请求: {} ({} 条消息)", url, messages.len());

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("响应解析失败: {}", e)))?;

        Ok(extract_reply(&payload))
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn chat(&self, messages: &[ChatMessage]) -> AppResult<String> {
        let total = self.endpoints.len();
        if total == 0 {
            return Err(AppError::ExternalService(
                "No hay endpoints del backend configurados.".to_string(),
            ));
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % total;
        let mut last_error = String::new();

        for offset in 0..total {
            let endpoint = &self.endpoints[(start + offset) % total];
            let started = Instant::now();

            match self.call_endpoint(endpoint, messages).await {
                Ok(reply) => {
                    let elapsed = started.elapsed();
                    metrics::BACKEND_LATENCY_SECONDS.observe(elapsed.as_secs_f64());
                    info!(
                        "✅ 推理后端返回: {} ({}ms, {} 字符)",
                        endpoint,
                        elapsed.as_millis(),
                        reply.chars().count()
                    );
                    return Ok(reply);
                }
                Err(e) => {
                    metrics::BACKEND_ERRORS_TOTAL.inc();
                    warn!("⚠️ 推理端点 {} 调用失败: {}", endpoint, e);
                    last_error = e.to_string();
                }
            }
        }

        error!("❌ 所有推理端点均不可用 ({} 个)", total);
        Err(AppError::ExternalService(format!(
            "No se pudo obtener respuesta del backend. Último error: {}",
            last_error
        )))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// 从后端响应中提取回复文本
///
/// 依次尝试 `message.content`（非空）、`response`、`choices[0].message.content`，
/// 都不存在时原样返回 JSON 文本。
pub fn extract_reply(payload: &Value) -> String {
    if let Some(content) = payload
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    {
        if !content.is_empty() {
            return content.trim().to_string();
        }
    }

    if let Some(response) = payload.get("response").and_then(Value::as_str) {
        return response.trim().to_string();
    }

    if let Some(message) = payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .filter(|message| message.is_object())
    {
        return message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
    }

    payload.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_chat_format() {
        let payload = json!({"message": {"role": "assistant", "content": "  {\"a\":1}  "}});
        assert_eq!(extract_reply(&payload), "{\"a\":1}");
    }

    #[test]
    fn test_extract_generate_format() {
        let payload = json!({"message": {"content": ""}, "response": "hola"});
        assert_eq!(extract_reply(&payload), "hola");
    }

    #[test]
    fn test_extract_choices_format() {
        let payload = json!({"choices": [{"message": {"content": "respuesta"}}]});
        assert_eq!(extract_reply(&payload), "respuesta");

        let empty = json!({"choices": [{"message": {}}]});
        assert_eq!(extract_reply(&empty), "");
    }

    #[test]
    fn test_extract_unknown_format_echoes_json() {
        let payload = json!({"done": true});
        assert_eq!(extract_reply(&payload), r#"{"done":true}"#);

        let empty_choices = json!({"choices": []});
        assert_eq!(extract_reply(&empty_choices), r#"{"choices":[]}"#);
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        let request = ChatRequest {
            model: "gemma2:2b",
            messages: &messages,
            stream: false,
            format: "json",
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "gemma2:2b",
                "messages": [
                    {"role": "system", "content": "s"},
                    {"role": "user", "content": "u"}
                ],
                "stream": false,
                "format": "json"
            })
        );
    }

    #[test]
    fn test_client_trims_endpoint_slashes() {
        let config = BackendConfig {
            endpoints: vec!["http://localhost:11434/".to_string()],
            ..BackendConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.endpoints(), ["http://localhost:11434".to_string()]);
        assert_eq!(client.name(), "ollama");
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_report_last_error() {
        // 端口 9 (discard) 在测试环境中不会有 HTTP 服务
        let config = BackendConfig {
            endpoints: vec![
                "http://127.0.0.1:9".to_string(),
                "http://127.0.0.1:9/".to_string(),
            ],
            timeout_seconds: 2,
            ..BackendConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();

        let error = client.chat(&[ChatMessage::user("hola")]).await.unwrap_err();
        match error {
            AppError::ExternalService(message) => {
                assert!(message.starts_with("No se pudo obtener respuesta del backend. Último error:"));
            }
            other => panic!("意外的错误类型: {:?}", other),
        }
    }

    /// 启动一个总是返回固定内容的 /api/chat 服务，返回其地址
    async fn spawn_chat_server(reply: &'static str) -> String {
        let app = axum::Router::new().route(
            CHAT_PATH,
            axum::routing::post(move || async move {
                axum::Json(json!({"message": {"role": "assistant", "content": reply}}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", address)
    }

    fn client_for(endpoints: Vec<String>) -> OllamaClient {
        let config = BackendConfig {
            endpoints,
            timeout_seconds: 5,
            ..BackendConfig::default()
        };
        OllamaClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_failing_endpoint_falls_through_to_next() {
        let healthy = spawn_chat_server("respuesta del respaldo").await;
        let client = client_for(vec!["http://127.0.0.1:9".to_string(), healthy]);

        // 第一次从不可达端点开始，第二次直接落在可用端点
        for _ in 0..2 {
            let reply = client.chat(&[ChatMessage::user("hola")]).await.unwrap();
            assert_eq!(reply, "respuesta del respaldo");
        }
    }

    #[tokio::test]
    async fn test_round_robin_advances_per_call() {
        let first = spawn_chat_server("a").await;
        let second = spawn_chat_server("b").await;
        let client = client_for(vec![first, second]);

        let mut replies = Vec::new();
        for _ in 0..4 {
            replies.push(client.chat(&[ChatMessage::user("hola")]).await.unwrap());
        }
        assert_eq!(replies, ["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_no_endpoints_configured() {
        let config = BackendConfig {
            endpoints: Vec::new(),
            ..BackendConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert!(client.chat(&[ChatMessage::user("hola")]).await.is_err());
    }
}
