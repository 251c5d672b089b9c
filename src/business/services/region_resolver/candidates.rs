//! 候选名称推导与句中片段提取

use once_cell::sync::Lazy;
use regex::Regex;

use crate::shared::constants::regions::MIN_CANDIDATE_LENGTH;
use crate::shared::utils::normalize_text;

/// 名称中的分隔符（连字符、破折号、括号、逗号、斜杠、加号）
static SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[-–—(,/+]\s*").expect("静态正则"));

/// 句尾介词结构："... de/en [la/el] <尾部>"
static TRAILING_PREPOSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:de|en)\s+(?:la\s+|el\s+)?([a-z\s]{2,})$").expect("静态正则")
});

/// 常见的前导限定词
const QUALIFIER_PREFIXES: &[&str] = &["municipio de ", "partido de ", "ciudad de "];

/// 片段最多取的词数
const MAX_SPAN_WORDS: usize = 3;

/// 由一个原始字段值推导候选：完整值、首个分隔符之前的部分、去掉限定词后的值
///
/// 结果均为规范化文本，去重，长度不足的候选被丢弃。
pub fn derive_candidates(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let full = normalize_text(raw);
    if full.chars().count() < MIN_CANDIDATE_LENGTH {
        return Vec::new();
    }

    let mut candidates = vec![full.clone()];

    if let Some(separator) = SEPARATOR.find(raw) {
        let head = raw[..separator.start()].trim();
        if head != raw {
            push_unique(&mut candidates, normalize_text(head));
        }
    }

    for prefix in QUALIFIER_PREFIXES {
        if let Some(rest) = full.strip_prefix(prefix) {
            push_unique(&mut candidates, rest.trim().to_string());
        }
    }

    candidates.retain(|candidate| candidate.chars().count() >= MIN_CANDIDATE_LENGTH);
    candidates
}

/// 从规范化句子中提取可能的地名片段
///
/// 先取介词之后尾部的最后 3、2、1 个词，再取整句最后 3、2、1 个词，去重并保持顺序。
pub fn extract_spans(normalized: &str) -> Vec<String> {
    let mut spans = Vec::new();

    if let Some(captures) = TRAILING_PREPOSITION.captures(normalized) {
        if let Some(tail) = captures.get(1) {
            let tail_words: Vec<&str> = tail.as_str().split_whitespace().collect();
            push_suffixes(&mut spans, &tail_words);
        }
    }

    let words: Vec<&str> = normalized.split_whitespace().collect();
    push_suffixes(&mut spans, &words);

    spans
}

fn push_suffixes(spans: &mut Vec<String>, words: &[&str]) {
    for n in (1..=MAX_SPAN_WORDS).rev() {
        if words.len() >= n {
            push_unique(spans, words[words.len() - n..].join(" "));
        }
    }
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !value.is_empty() && !values.contains(&value) {
        values.push(value);
    }
}
