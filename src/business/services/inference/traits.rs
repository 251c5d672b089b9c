//! 推理后端抽象接口

use async_trait::async_trait;

use crate::business::domain::ChatMessage;
use crate::shared::AppResult;

/// 推理后端：接收一组对话消息，返回模型的原始文本回复
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// 发送对话请求
    ///
    /// 所有端点都失败时返回 `AppError::ExternalService`，错误信息可直接作为模型输出交给分类器。
    async fn chat(&self, messages: &[ChatMessage]) -> AppResult<String>;

    /// 后端名称，用于日志
    fn name(&self) -> &str;
}
