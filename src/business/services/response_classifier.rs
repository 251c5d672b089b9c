//! 模型回复分类器
//!
//! 将模型的自由文本回复解析为结构化对象。解析策略是一个有序列表，
//! 每个策略返回可选的对象，第一个包含分类字段的对象胜出；
//! 全部失败时返回确定性的兜底对象。该路径本身就是错误恢复的终点，不会失败。

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::business::domain::Classification;
use crate::infrastructure::config::ClassifierConfig;
use crate::shared::constants::classifier::RAW_EXCERPT_CHARS;
use crate::shared::utils::truncate_chars;

/// ```json ... ``` 代码块
static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(\{.*\})\s*```").expect("静态正则"));

type ParseStrategy = fn(&str) -> Option<Map<String, Value>>;

/// 按顺序尝试的解析策略
const STRATEGIES: &[(&str, ParseStrategy)] = &[
    ("direct", parse_direct),
    ("fenced_block", parse_fenced_block),
    ("brace_span", parse_brace_span),
];

/// 回复分类器
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    config: ClassifierConfig,
}

impl ResponseClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// 分类字段名
    pub fn classification_key(&self) -> &str {
        &self.config.classification_key
    }

    pub fn classify(&self, raw: &str) -> Classification {
        let key = self.config.classification_key.as_str();

        for (name, strategy) in STRATEGIES {
            match strategy(raw) {
                Some(object) if object.contains_key(key) => {
                    debug!("✅ 回复解析成功 (策略: {})", name);
                    return Classification::Structured(object);
                }
                Some(_) => debug!("🔍 策略 {} 解析出对象但缺少字段 '{}'", name, key),
                None => debug!("🔍 策略 {} 未能解析", name),
            }
        }

        warn!(
            "❌ 模型回复无法分类，返回兜底对象 (原始长度: {} 字符)",
            raw.chars().count()
        );
        Classification::Fallback(self.fallback(raw))
    }

    /// 确定性兜底对象：固定紧急度、哨兵分类、附带原始输出摘录
    pub fn fallback(&self, raw: &str) -> Map<String, Value> {
        let message = format!(
            "**Error de Clasificación (Modelo Fallido):** La IA no pudo generar el formato de datos necesario. \
             Esto ocurre si la pregunta es muy corta o el modelo falló. **Output crudo:** {}...",
            truncate_chars(raw, RAW_EXCERPT_CHARS)
        );

        let mut object = Map::new();
        object.insert(
            self.config.urgency_key.clone(),
            Value::String(self.config.fallback_urgency.clone()),
        );
        object.insert(
            self.config.classification_key.clone(),
            Value::String(self.config.fallback_classification.clone()),
        );
        object.insert(self.config.message_key.clone(), Value::String(message));
        object
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// 整段文本直接解析
fn parse_direct(raw: &str) -> Option<Map<String, Value>> {
    parse_object(raw)
}

/// 解析带 json 标记的代码块
fn parse_fenced_block(raw: &str) -> Option<Map<String, Value>> {
    let captures = FENCED_JSON.captures(raw)?;
    parse_object(captures.get(1)?.as_str())
}

/// 解析第一个 '{' 到最后一个 '}' 之间的内容
fn parse_brace_span(raw: &str) -> Option<Map<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&raw[start..=end])
}
