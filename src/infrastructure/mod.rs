//! 基础设施层模块
//!
//! 负责配置管理与参考数据持久化

pub mod config;
pub mod database;

// 重新导出常用类型
pub use config::Config;
pub use database::{load_reference_data, RegionStore};
