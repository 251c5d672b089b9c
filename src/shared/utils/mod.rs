//! 工具函数模块

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").expect("静态正则"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("静态正则"));
static SESSION_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]{1,64}$").expect("静态正则"));

/// 去除变音符号（á → a, ñ → n）
pub fn strip_diacritics(input: &str) -> String {
    input.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// 文本规范化：小写、去变音符号、非字母数字替换为空格、压缩空白
///
/// 网关内所有比较都基于规范化后的文本，原始字符串不直接比较。
pub fn normalize_text(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }
    let lowered = strip_diacritics(&input.to_lowercase());
    let replaced = NON_ALNUM.replace_all(&lowered, " ");
    WHITESPACE.replace_all(&replaced, " ").trim().to_string()
}

/// 列名规范化：大写、空白替换为下划线、去变音符号
pub fn normalize_column_name(name: &str) -> String {
    let upper = name.trim().to_uppercase();
    let underscored = WHITESPACE.replace_all(&upper, "_");
    strip_diacritics(&underscored)
}

/// 按字符截断（不会切断多字节字符）
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

/// 校验客户端提供的会话ID，不合法时生成新的UUID
pub fn sanitize_session_id(raw: Option<&str>) -> String {
    if let Some(raw) = raw {
        let candidate = raw.trim().to_lowercase();
        if SESSION_ID.is_match(&candidate) {
            return candidate;
        }
    }
    uuid::Uuid::new_v4().to_string()
}

/// 解析逗号分隔列表，忽略空项
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}

/// 解析布尔型环境变量取值
pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}
