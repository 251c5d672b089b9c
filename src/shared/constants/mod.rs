//! 常量定义模块

/// 服务器相关常量
pub mod server {
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 8001;
    pub const MAX_CONTENT_LENGTH_BYTES: usize = 1024 * 1024; // 1MB
}

/// 速率限制相关常量
pub mod rate_limit {
    pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 30;
    pub const BURST_CAPACITY: u32 = 10;
    pub const MAX_TRACKED_CLIENTS: usize = 10_000;
    pub const MIN_SWEEP_IDLE_SECONDS: u64 = 60;
}

/// 推理后端相关常量
pub mod backend {
    pub const DEFAULT_ENDPOINT: &str = "http://ollama:11434";
    pub const DEFAULT_MODEL: &str = "gemma2:2b";
    pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
    pub const MAX_CONCURRENT_CALLS: usize = 4;
    pub const CHAT_PATH: &str = "/api/chat";
}

/// 地区参考数据相关常量
pub mod regions {
    pub const DEFAULT_CSV_PATH: &str = "data/datos_tierras.csv";
    pub const DEFAULT_DB_PATH: &str = "regions.db";
    pub const TABLE_NAME: &str = "regions";
    /// 旧版数据库中的表名，读取时作为后备
    pub const LEGACY_TABLE_NAME: &str = "municipios";
    pub const SIMILARITY_THRESHOLD: f64 = 0.85;
    pub const MIN_CANDIDATE_LENGTH: usize = 3;

    pub const PRIMARY_FIELD: &str = "MUNICIPIO";
    pub const LOCALITIES_FIELD: &str = "LOCALIDADES";
    pub const SEAT_FIELD: &str = "CABECERA";
}

/// 分类器相关常量
pub mod classifier {
    pub const CLASSIFICATION_KEY: &str = "classification";
    pub const URGENCY_KEY: &str = "urgency";
    pub const MESSAGE_KEY: &str = "extended_response";
    pub const FALLBACK_CLASSIFICATION: &str = "MODEL_ERROR";
    pub const FALLBACK_URGENCY: &str = "5";
    pub const RAW_EXCERPT_CHARS: usize = 200;
}

/// 系统提示词相关常量
pub mod prompt {
    pub const DEFAULT_PATH: &str = "system_prompt.txt";
    pub const MISSING_PROMPT: &str =
        "ERROR: system_prompt.txt no encontrado. No se puede clasificar.";
}
