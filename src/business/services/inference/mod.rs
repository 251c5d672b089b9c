//! 推理后端模块

pub mod client;
pub mod traits;

pub use client::{extract_reply, OllamaClient};
pub use traits::InferenceBackend;
