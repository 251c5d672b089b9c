//! HTTP请求处理器模块

pub mod generate;
pub mod health;
pub mod prompt;
