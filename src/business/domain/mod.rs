//! 领域模型模块
//!
//! 地区记录、对话消息、分类结果等核心类型

pub mod region;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use region::RegionRecord;

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 发送给推理后端的单条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// 分类结果：结构化对象或兜底对象
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// 模型回复中成功提取、且包含分类字段的对象
    Structured(Map<String, Value>),
    /// 无法提取时的确定性兜底对象
    Fallback(Map<String, Value>),
}

impl Classification {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Classification::Fallback(_))
    }

    pub fn content(&self) -> &Map<String, Value> {
        match self {
            Classification::Structured(map) | Classification::Fallback(map) => map,
        }
    }

    pub fn into_content(self) -> Map<String, Value> {
        match self {
            Classification::Structured(map) | Classification::Fallback(map) => map,
        }
    }

    pub fn reply_kind(&self) -> ReplyKind {
        match self {
            Classification::Structured(_) => ReplyKind::StructuredData,
            Classification::Fallback(_) => ReplyKind::ErrorFallback,
        }
    }
}

/// 网关回复类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    StructuredData,
    ErrorFallback,
}

impl ReplyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyKind::StructuredData => "structured_data",
            ReplyKind::ErrorFallback => "error_fallback",
        }
    }
}
