//! HTTP数据传输对象

pub mod generate;
pub mod health;

pub use generate::{GenerateResponse, SavePromptRequest};
pub use health::HealthResponse;
