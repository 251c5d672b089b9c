//! 统一错误处理模块
//!
//! 定义网关中所有错误类型，提供统一的错误处理机制

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// 应用程序统一错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入验证错误（缺少或为空的prompt等）
    #[error("输入无效: {0}")]
    Validation(String),

    /// 客户端令牌桶耗尽
    #[error("请求频率超限，请 {retry_after_seconds} 秒后重试")]
    RateLimited { retry_after_seconds: u64 },

    /// 推理后端并发槽位已满
    #[error("系统繁忙: 推理后端并发已满")]
    Saturated,

    /// 外部服务错误（推理后端不可达、超时等）
    #[error("外部服务错误: {0}")]
    ExternalService(String),

    /// 参考数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    /// 文件读写错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置错误
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AppError {
    /// 获取HTTP状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Saturated => StatusCode::TOO_MANY_REQUESTS,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 获取错误代码
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::Saturated => "BACKEND_SATURATED",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Configuration(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否属于准入控制拒绝（限流或并发饱和）
    pub fn is_admission_rejection(&self) -> bool {
        matches!(self, AppError::RateLimited { .. } | AppError::Saturated)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_code = self.error_code();

        // 准入拒绝是正常结果，不按错误级别记录
        if self.is_admission_rejection() || matches!(self, AppError::Validation(_)) {
            tracing::warn!(
                status = ?status_code,
                error_code = error_code,
                error = %self,
                "请求被拒绝"
            );
        } else {
            tracing::error!(
                status = ?status_code,
                error_code = error_code,
                error = %self,
                "处理请求时发生错误"
            );
        }

        let mut error = json!({
            "code": error_code,
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        match &self {
            AppError::RateLimited { retry_after_seconds } => {
                error["retry_after_seconds"] = json!(retry_after_seconds);
            }
            AppError::Saturated => {
                error["reason"] = json!("backend_saturated");
            }
            _ => {}
        }

        let mut response = (status_code, Json(json!({ "error": error }))).into_response();
        if let AppError::RateLimited { retry_after_seconds } = self {
            if let Ok(value) = retry_after_seconds.to_string().parse() {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 验证错误构造宏
#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::shared::error::AppError::Validation($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::shared::error::AppError::Validation(format!($fmt, $($arg)*))
    };
}

/// 内部错误构造宏
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::shared::error::AppError::Internal($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::shared::error::AppError::Internal(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(validation_error!("prompt为空").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::RateLimited { retry_after_seconds: 2 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AppError::Saturated.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(internal_error!("x {}", 1).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_admission_rejection() {
        assert!(AppError::Saturated.is_admission_rejection());
        assert!(AppError::RateLimited { retry_after_seconds: 1 }.is_admission_rejection());
        assert!(!AppError::ExternalService("timeout".into()).is_admission_rejection());
    }

    #[test]
    fn test_rate_limited_response_has_retry_after() {
        let response = AppError::RateLimited { retry_after_seconds: 3 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
            "3"
        );
    }
}
