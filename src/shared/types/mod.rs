//! 共享类型定义模块

use serde::{Deserialize, Serialize};

/// 客户端标识类型（通常为网络地址）
pub type ClientId = String;

/// 会话ID类型（仅用于链路追踪）
pub type SessionId = String;

/// 简单操作结果响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}
