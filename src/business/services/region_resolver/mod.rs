//! 地区解析服务
//!
//! 从自由文本中识别地区记录，三种策略按优先级执行，第一个命中即返回：
//! 1. 字面包含：候选名以完整词的形式出现在文本中
//! 2. 全局模糊：整句与所有候选名的最大相似度达到阈值
//! 3. 片段提取：从句中提取可能的地名片段，逐个执行模糊匹配
//!
//! 同一策略内按记录加载顺序决胜，结果是确定的。

pub mod candidates;
pub mod similarity;

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::business::domain::RegionRecord;
use crate::shared::utils::normalize_text;
use candidates::{derive_candidates, extract_spans};
use similarity::{ratio_upper_bound, similarity_ratio};

/// 命中的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Literal,
    Fuzzy,
    Span,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Literal => "literal",
            MatchStrategy::Fuzzy => "fuzzy",
            MatchStrategy::Span => "span",
        }
    }
}

/// 解析结果
#[derive(Debug, Clone)]
pub struct RegionMatch {
    pub record: Arc<RegionRecord>,
    pub strategy: MatchStrategy,
    pub score: f64,
}

/// 预先推导好候选名的记录
#[derive(Debug)]
struct IndexedRecord {
    record: Arc<RegionRecord>,
    candidates: Vec<String>,
}

/// 地区解析器，加载后只读
#[derive(Debug)]
pub struct RegionResolver {
    entries: Vec<IndexedRecord>,
    similarity_threshold: f64,
}

impl RegionResolver {
    pub fn new(records: Vec<RegionRecord>, similarity_threshold: f64) -> Self {
        let entries = records
            .into_iter()
            .map(|record| {
                let mut candidates: Vec<String> = Vec::new();
                for value in record.searchable_values() {
                    for candidate in derive_candidates(value) {
                        if !candidates.contains(&candidate) {
                            candidates.push(candidate);
                        }
                    }
                }
                IndexedRecord {
                    record: Arc::new(record),
                    candidates,
                }
            })
            .collect::<Vec<_>>();

        info!(
            "📍 地区解析器就绪: {} 条记录, 相似度阈值 {:.2}",
            entries.len(),
            similarity_threshold
        );

        Self {
            entries,
            similarity_threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// 依次执行三种策略
    #[instrument(skip(self, text), fields(records = self.entries.len()))]
    pub fn resolve(&self, text: &str) -> Option<RegionMatch> {
        let normalized = normalize_text(text);
        if normalized.is_empty() || self.entries.is_empty() {
            return None;
        }

        let found = self
            .find_literal(&normalized)
            .or_else(|| self.find_fuzzy(&normalized, MatchStrategy::Fuzzy))
            .or_else(|| self.find_in_spans(&normalized));

        match &found {
            Some(hit) => debug!(
                "📍 地区命中: {} (策略: {}, 分数: {:.3})",
                hit.record.display_name(),
                hit.strategy.as_str(),
                hit.score
            ),
            None => debug!("📍 未识别到地区"),
        }
        found
    }

    /// 策略一：候选名以完整词形式出现在文本中
    ///
    /// 规范化文本只含 [a-z0-9] 与单个空格，两侧补空格后的包含判断即词边界匹配。
    fn find_literal(&self, normalized: &str) -> Option<RegionMatch> {
        let padded = format!(" {} ", normalized);
        self.entries.iter().find_map(|entry| {
            entry
                .candidates
                .iter()
                .any(|candidate| padded.contains(&format!(" {} ", candidate)))
                .then(|| RegionMatch {
                    record: entry.record.clone(),
                    strategy: MatchStrategy::Literal,
                    score: 1.0,
                })
        })
    }

    /// 策略二：全局最高相似度，严格大于才替换，故平分时先加载的记录胜出
    ///
    /// 长度上界已低于阈值的候选不可能被接受，直接跳过，结果不变。
    fn find_fuzzy(&self, query: &str, strategy: MatchStrategy) -> Option<RegionMatch> {
        if query.is_empty() {
            return None;
        }

        let query_len = query.chars().count();
        let mut best: Option<(&IndexedRecord, f64)> = None;
        for entry in &self.entries {
            for candidate in &entry.candidates {
                let bound = ratio_upper_bound(query_len, candidate.chars().count());
                if bound < self.similarity_threshold {
                    continue;
                }
                let score = similarity_ratio(query, candidate);
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((entry, score));
                }
            }
        }

        best.filter(|(_, score)| *score >= self.similarity_threshold)
            .map(|(entry, score)| RegionMatch {
                record: entry.record.clone(),
                strategy,
                score,
            })
    }

    /// 策略三：对句中提取的片段逐个做模糊匹配
    fn find_in_spans(&self, normalized: &str) -> Option<RegionMatch> {
        extract_spans(normalized)
            .iter()
            .find_map(|span| self.find_fuzzy(span, MatchStrategy::Span))
    }
}
