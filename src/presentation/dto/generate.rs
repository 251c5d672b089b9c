//! /generate 与提示词接口的数据传输对象

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::business::domain::ReplyKind;
use crate::business::services::GatewayReply;

/// /generate 响应体
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub role: String,
    /// 分类对象（成功时为模型输出，失败时为兜底对象）
    pub content: Map<String, Value>,
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: ReplyKind,
}

impl From<GatewayReply> for GenerateResponse {
    fn from(reply: GatewayReply) -> Self {
        let kind = reply.classification.reply_kind();
        Self {
            role: "assistant".to_string(),
            content: reply.classification.into_content(),
            session_id: reply.session_id,
            kind,
        }
    }
}

/// 保存提示词请求
#[derive(Debug, Deserialize)]
pub struct SavePromptRequest {
    pub content: Option<String>,
}
