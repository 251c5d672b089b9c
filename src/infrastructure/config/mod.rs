use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;

use crate::shared::constants::{backend, classifier, prompt, rate_limit, regions, server};
use crate::shared::utils::{parse_flag, parse_list};
use crate::shared::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub backend: BackendConfig,
    pub regions: RegionConfig,
    pub classifier: ClassifierConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_content_length: usize,
    /// 是否信任 X-Forwarded-For 头部
    pub trust_proxy: bool,
    pub static_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
    pub whitelist: HashSet<String>,
    pub max_tracked_clients: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub endpoints: Vec<String>,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub csv_path: String,
    pub db_path: String,
    pub similarity_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub classification_key: String,
    pub urgency_key: String,
    pub message_key: String,
    pub fallback_classification: String,
    pub fallback_urgency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub system_prompt_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            backend: BackendConfig::default(),
            regions: RegionConfig::default(),
            classifier: ClassifierConfig::default(),
            prompt: PromptConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: server::DEFAULT_HOST.to_string(),
            port: server::DEFAULT_PORT,
            max_content_length: server::MAX_CONTENT_LENGTH_BYTES,
            trust_proxy: false,
            static_dir: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: rate_limit::DEFAULT_REQUESTS_PER_MINUTE,
            burst: rate_limit::BURST_CAPACITY,
            whitelist: HashSet::new(),
            max_tracked_clients: rate_limit::MAX_TRACKED_CLIENTS,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![backend::DEFAULT_ENDPOINT.to_string()],
            model: backend::DEFAULT_MODEL.to_string(),
            timeout_seconds: backend::DEFAULT_TIMEOUT_SECONDS,
            max_concurrent: backend::MAX_CONCURRENT_CALLS,
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            csv_path: regions::DEFAULT_CSV_PATH.to_string(),
            db_path: regions::DEFAULT_DB_PATH.to_string(),
            similarity_threshold: regions::SIMILARITY_THRESHOLD,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            classification_key: classifier::CLASSIFICATION_KEY.to_string(),
            urgency_key: classifier::URGENCY_KEY.to_string(),
            message_key: classifier::MESSAGE_KEY.to_string(),
            fallback_classification: classifier::FALLBACK_CLASSIFICATION.to_string(),
            fallback_urgency: classifier::FALLBACK_URGENCY.to_string(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt_path: prompt::DEFAULT_PATH.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> AppResult<Self> {
        // 从环境变量加载配置
        dotenv::dotenv().ok();

        // OLLAMA_ENDPOINTS 优先，兼容单个 OLLAMA_ENDPOINT
        let endpoints = env::var("OLLAMA_ENDPOINTS")
            .map(|raw| parse_list(&raw))
            .ok()
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| {
                vec![env::var("OLLAMA_ENDPOINT")
                    .unwrap_or_else(|_| backend::DEFAULT_ENDPOINT.to_string())]
            });

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST")
                    .unwrap_or_else(|_| server::DEFAULT_HOST.to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| server::DEFAULT_PORT.to_string())
                    .parse()
                    .unwrap_or(server::DEFAULT_PORT),
                max_content_length: env::var("MAX_CONTENT_LENGTH")
                    .unwrap_or_else(|_| server::MAX_CONTENT_LENGTH_BYTES.to_string())
                    .parse()
                    .unwrap_or(server::MAX_CONTENT_LENGTH_BYTES),
                trust_proxy: env::var("TRUST_PROXY")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(false),
                static_dir: env::var("STATIC_DIR").ok().filter(|v| !v.trim().is_empty()),
            },

            rate_limit: RateLimitConfig {
                requests_per_minute: env::var("RATE_LIMIT_RPM")
                    .unwrap_or_else(|_| rate_limit::DEFAULT_REQUESTS_PER_MINUTE.to_string())
                    .parse()
                    .unwrap_or(rate_limit::DEFAULT_REQUESTS_PER_MINUTE),
                burst: env::var("RATE_LIMIT_BURST")
                    .unwrap_or_else(|_| rate_limit::BURST_CAPACITY.to_string())
                    .parse()
                    .unwrap_or(rate_limit::BURST_CAPACITY),
                whitelist: env::var("WHITELIST_IPS")
                    .map(|raw| parse_list(&raw).into_iter().collect())
                    .unwrap_or_default(),
                max_tracked_clients: env::var("RATE_LIMIT_MAX_CLIENTS")
                    .unwrap_or_else(|_| rate_limit::MAX_TRACKED_CLIENTS.to_string())
                    .parse()
                    .unwrap_or(rate_limit::MAX_TRACKED_CLIENTS),
            },

            backend: BackendConfig {
                endpoints,
                model: env::var("OLLAMA_MODEL")
                    .unwrap_or_else(|_| backend::DEFAULT_MODEL.to_string()),
                timeout_seconds: env::var("OLLAMA_TIMEOUT")
                    .unwrap_or_else(|_| backend::DEFAULT_TIMEOUT_SECONDS.to_string())
                    .parse()
                    .unwrap_or(backend::DEFAULT_TIMEOUT_SECONDS),
                max_concurrent: env::var("MAX_CONCURRENT_GPU")
                    .unwrap_or_else(|_| backend::MAX_CONCURRENT_CALLS.to_string())
                    .parse()
                    .unwrap_or(backend::MAX_CONCURRENT_CALLS),
            },

            regions: RegionConfig {
                csv_path: env::var("REGIONS_CSV_PATH")
                    .unwrap_or_else(|_| regions::DEFAULT_CSV_PATH.to_string()),
                db_path: env::var("REGIONS_DB_PATH")
                    .unwrap_or_else(|_| regions::DEFAULT_DB_PATH.to_string()),
                similarity_threshold: env::var("SIMILARITY_THRESHOLD")
                    .unwrap_or_else(|_| regions::SIMILARITY_THRESHOLD.to_string())
                    .parse()
                    .unwrap_or(regions::SIMILARITY_THRESHOLD),
            },

            classifier: ClassifierConfig {
                classification_key: env::var("CLASSIFICATION_KEY")
                    .unwrap_or_else(|_| classifier::CLASSIFICATION_KEY.to_string()),
                urgency_key: env::var("URGENCY_KEY")
                    .unwrap_or_else(|_| classifier::URGENCY_KEY.to_string()),
                message_key: env::var("FALLBACK_MESSAGE_KEY")
                    .unwrap_or_else(|_| classifier::MESSAGE_KEY.to_string()),
                fallback_classification: env::var("FALLBACK_CLASSIFICATION")
                    .unwrap_or_else(|_| classifier::FALLBACK_CLASSIFICATION.to_string()),
                fallback_urgency: env::var("FALLBACK_URGENCY")
                    .unwrap_or_else(|_| classifier::FALLBACK_URGENCY.to_string()),
            },

            prompt: PromptConfig {
                system_prompt_path: env::var("SYSTEM_PROMPT_PATH")
                    .unwrap_or_else(|_| prompt::DEFAULT_PATH.to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// 校验配置取值
    pub fn validate(&self) -> AppResult<()> {
        if self.backend.endpoints.is_empty() {
            return Err(AppError::Configuration("未配置推理后端地址".to_string()));
        }
        for endpoint in &self.backend.endpoints {
            let parsed = url::Url::parse(endpoint).map_err(|e| {
                AppError::Configuration(format!("推理后端地址无效 '{}': {}", endpoint, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::Configuration(format!(
                    "推理后端地址协议不受支持: {}",
                    endpoint
                )));
            }
        }

        let threshold = self.regions.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::Configuration(format!(
                "相似度阈值必须在0-1之间: {}",
                threshold
            )));
        }

        if self.classifier.classification_key.trim().is_empty() {
            return Err(AppError::Configuration("分类字段名不能为空".to_string()));
        }
        if self.backend.timeout_seconds == 0 {
            return Err(AppError::Configuration("推理后端超时必须大于0".to_string()));
        }

        Ok(())
    }
}
