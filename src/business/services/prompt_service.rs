use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::shared::constants::prompt::MISSING_PROMPT;
use crate::shared::error::AppResult;

/// 系统提示词服务
/// 负责从文件加载提示词并缓存在内存中，保存后立即重新加载
#[derive(Debug)]
pub struct SystemPromptService {
    path: PathBuf,
    cache: RwLock<String>,
}

impl SystemPromptService {
    /// 创建服务实例，缓存初始为占位文本，需调用 `initialize`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(MISSING_PROMPT.to_string()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 初始化提示词缓存
    pub async fn initialize(&self) {
        info!("📝 加载系统提示词: {}", self.path.display());
        self.reload().await;
    }

    /// 重新加载提示词，文件不存在时使用占位文本
    pub async fn reload(&self) {
        let content = match self.read_raw().await {
            Ok(Some(content)) => {
                info!("✅ 系统提示词已加载 ({} 字符)", content.chars().count());
                content
            }
            Ok(None) => {
                warn!("⚠️ 系统提示词文件不存在: {}", self.path.display());
                MISSING_PROMPT.to_string()
            }
            Err(e) => {
                warn!("⚠️ 读取系统提示词失败: {}", e);
                MISSING_PROMPT.to_string()
            }
        };
        *self.cache.write().await = content;
    }

    /// 当前生效的提示词
    pub async fn current(&self) -> String {
        self.cache.read().await.clone()
    }

    /// 直接读取文件内容，文件不存在时返回 None
    pub async fn read_raw(&self) -> AppResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入新的提示词并重新加载
    pub async fn save(&self, content: &str) -> AppResult<()> {
        tokio::fs::write(&self.path, content).await?;
        info!("💾 系统提示词已保存 ({} 字符)", content.chars().count());
        self.reload().await;
        Ok(())
    }
}

/// 共享的提示词服务
pub type SharedPromptService = Arc<SystemPromptService>;
