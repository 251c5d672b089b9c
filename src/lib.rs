//! 地区感知的分类网关
//!
//! 位于语言模型推理后端之前的准入与增强服务，基于三层架构设计

// 核心模块
pub mod shared;          // 共享模块（错误处理、类型定义、工具函数）
pub mod infrastructure;  // 基础设施层（配置、参考数据存储）
pub mod business;        // 业务逻辑层（领域模型、准入控制、地区解析、回复分类）
pub mod presentation;    // 表示层（HTTP处理、路由）

// 重新导出核心类型
pub use business::services::{GatewayPipeline, OllamaClient};
pub use infrastructure::{load_reference_data, Config};
pub use presentation::{create_routes, AppState};
pub use shared::{AppError, AppResult};
