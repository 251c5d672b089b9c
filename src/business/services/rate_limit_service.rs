use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::infrastructure::config::RateLimitConfig;
use crate::shared::constants::rate_limit::MIN_SWEEP_IDLE_SECONDS;

/// 单个客户端的令牌桶
#[derive(Debug, Clone)]
pub struct RateBucket {
    pub tokens: f64,
    pub last_refill: Instant,
}

impl RateBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// 按经过时间补充令牌，上限为桶容量
    fn refill(&mut self, now: Instant, refill_per_sec: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;
    }
}

/// 令牌桶表，附带按最近补充顺序排列的索引
///
/// 每次补充都在互斥锁内分配递增序号，序号顺序与 `last_refill` 顺序一致。
#[derive(Debug, Default)]
struct BucketTable {
    buckets: HashMap<String, (RateBucket, u64)>,
    recency: BTreeMap<u64, String>,
    next_seq: u64,
}

impl BucketTable {
    fn len(&self) -> usize {
        self.buckets.len()
    }

    /// 取得客户端的桶（不存在时创建满桶）并补充令牌，同时刷新其在索引中的位置
    fn touch(
        &mut self,
        client_id: &str,
        now: Instant,
        refill_per_sec: f64,
        capacity: f64,
    ) -> &mut RateBucket {
        let seq = self.next_seq;
        self.next_seq += 1;

        let (bucket, bucket_seq) = self
            .buckets
            .entry(client_id.to_string())
            .or_insert_with(|| (RateBucket::full(capacity, now), seq));
        self.recency.remove(&*bucket_seq);
        *bucket_seq = seq;
        self.recency.insert(seq, client_id.to_string());

        bucket.refill(now, refill_per_sec, capacity);
        bucket
    }

    /// 淘汰最久未补充的客户端
    fn evict_least_recent(&mut self) -> Option<String> {
        let (_, client_id) = self.recency.pop_first()?;
        self.buckets.remove(&client_id);
        Some(client_id)
    }

    /// 移除空闲时间不少于 `idle` 的桶，它们位于索引前部
    fn remove_idle(&mut self, now: Instant, idle: Duration) -> usize {
        let mut removed = 0;
        while let Some((_, client_id)) = self.recency.first_key_value() {
            let is_idle = self.buckets.get(client_id).map_or(true, |(bucket, _)| {
                now.saturating_duration_since(bucket.last_refill) >= idle
            });
            if !is_idle {
                break;
            }
            if let Some((_, client_id)) = self.recency.pop_first() {
                self.buckets.remove(&client_id);
                removed += 1;
            }
        }
        removed
    }
}

/// 速率限制结果
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitResult {
    Allowed,
    Exceeded { retry_after_seconds: u64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

/// 速率限制服务
/// 每个客户端一个连续补充的令牌桶，白名单客户端不受限制
pub struct RateLimitService {
    refill_per_sec: f64,
    capacity: f64,
    whitelist: HashSet<String>,
    max_tracked_clients: usize,
    buckets: Arc<Mutex<BucketTable>>,
}

impl RateLimitService {
    /// 创建新的速率限制服务
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            refill_per_sec: config.requests_per_minute as f64 / 60.0,
            capacity: config.burst as f64,
            whitelist: config.whitelist.clone(),
            max_tracked_clients: config.max_tracked_clients.max(1),
            buckets: Arc::new(Mutex::new(BucketTable::default())),
        }
    }

    /// 检查并消耗一个令牌
    pub async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult {
        if self.whitelist.contains(client_id) {
            debug!("✅ 白名单客户端 {} 直接放行", client_id);
            return RateLimitResult::Allowed;
        }

        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;

        if !buckets.buckets.contains_key(client_id) && buckets.len() >= self.max_tracked_clients {
            if let Some(evicted) = buckets.evict_least_recent() {
                debug!("🗑️ 令牌桶数量达到上限，淘汰最久未活动的客户端 {}", evicted);
            }
        }

        let bucket = buckets.touch(client_id, now, self.refill_per_sec, self.capacity);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            debug!("✅ 客户端 {} 速率检查通过: 剩余令牌 {:.2}", client_id, bucket.tokens);
            return RateLimitResult::Allowed;
        }

        let retry_after_seconds = self.seconds_until_next_token(bucket.tokens);
        warn!(
            "⚠️ 客户端 {} 触发限流: 令牌 {:.2}/{}, {}秒后可重试",
            client_id, bucket.tokens, self.capacity, retry_after_seconds
        );
        RateLimitResult::Exceeded { retry_after_seconds }
    }

    /// 只关心是否放行时的便捷接口
    pub async fn admit(&self, client_id: &str) -> bool {
        self.check_rate_limit(client_id).await.is_allowed()
    }

    /// 清理长时间空闲的令牌桶（定期调用）
    ///
    /// 空闲超过完全补满所需时间的桶已经是满的，移除后再次创建结果相同。
    pub async fn cleanup_idle_buckets(&self) -> usize {
        let idle = self.full_refill_duration();
        let now = Instant::now();

        let mut buckets = self.buckets.lock().await;
        let removed = buckets.remove_idle(now, idle);

        if removed > 0 {
            info!("🧹 清理空闲令牌桶 {} 个，当前记录数: {}", removed, buckets.len());
        }
        removed
    }

    /// 桶从空到满所需的时间，用作空闲清理阈值
    pub fn full_refill_duration(&self) -> Duration {
        let min = Duration::from_secs(MIN_SWEEP_IDLE_SECONDS);
        if self.refill_per_sec <= 0.0 {
            return min;
        }
        Duration::from_secs_f64(self.capacity / self.refill_per_sec).max(min)
    }

    /// 当前跟踪的客户端数量
    pub async fn tracked_clients(&self) -> usize {
        self.buckets.lock().await.len()
    }

    fn seconds_until_next_token(&self, tokens: f64) -> u64 {
        if self.refill_per_sec <= 0.0 {
            return 60;
        }
        ((1.0 - tokens) / self.refill_per_sec).ceil().max(1.0) as u64
    }
}

/// 全局速率限制服务实例
pub type SharedRateLimitService = Arc<RateLimitService>;

#[cfg(test)]
mod tests {
    use super::*;

    fn service(rpm: u32, burst: u32) -> RateLimitService {
        RateLimitService::new(&RateLimitConfig {
            requests_per_minute: rpm,
            burst,
            whitelist: HashSet::from(["10.0.0.1".to_string()]),
            max_tracked_clients: 100,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_deny_then_refill() {
        let limiter = service(30, 10);

        for i in 0..10 {
            assert!(limiter.admit("1.2.3.4").await, "第 {} 个突发请求应被放行", i + 1);
        }
        assert!(!limiter.admit("1.2.3.4").await, "第 11 个立即请求应被拒绝");

        // 60/R 秒后补充一个令牌
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(limiter.admit("1.2.3.4").await, "等待后应放行一个请求");
        assert!(!limiter.admit("1.2.3.4").await, "令牌再次耗尽");
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_rate_always_admitted() {
        let limiter = service(30, 1);
        for _ in 0..20 {
            assert!(limiter.admit("5.6.7.8").await);
            tokio::time::advance(Duration::from_secs(2)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_capped_at_burst() {
        let limiter = service(60, 3);
        assert!(limiter.admit("c").await);
        // 长时间空闲也不会超过容量
        tokio::time::advance(Duration::from_secs(3600)).await;
        for _ in 0..3 {
            assert!(limiter.admit("c").await);
        }
        assert!(!limiter.admit("c").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exceeded_reports_retry_after() {
        let limiter = service(30, 1);
        assert!(limiter.admit("c").await);
        assert_eq!(
            limiter.check_rate_limit("c").await,
            RateLimitResult::Exceeded { retry_after_seconds: 2 }
        );
    }

    #[tokio::test]
    async fn test_whitelist_bypasses_bucket() {
        let limiter = service(1, 1);
        for _ in 0..50 {
            assert!(limiter.admit("10.0.0.1").await);
        }
        assert_eq!(limiter.tracked_clients().await, 0, "白名单客户端不创建令牌桶");
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = service(1, 1);
        assert!(limiter.admit("a").await);
        assert!(!limiter.admit("a").await);
        assert!(limiter.admit("b").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_when_full() {
        let limiter = RateLimitService::new(&RateLimitConfig {
            requests_per_minute: 1,
            burst: 1,
            whitelist: HashSet::new(),
            max_tracked_clients: 2,
        });
        assert!(limiter.admit("old").await);
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(limiter.admit("mid").await);
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(limiter.admit("new").await);

        assert_eq!(limiter.tracked_clients().await, 2);
        assert!(!limiter.admit("new").await);
        assert!(limiter.admit("old").await, "old 已被淘汰，重新创建的桶是满的");
        assert_eq!(limiter.tracked_clients().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_idle_buckets() {
        let limiter = service(30, 10);
        assert!(limiter.admit("idle").await);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.admit("active").await);

        // 满补时间 = max(10 / 0.5, 60) = 60 秒
        assert_eq!(limiter.full_refill_duration(), Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(limiter.cleanup_idle_buckets().await, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_follows_latest_activity() {
        let limiter = RateLimitService::new(&RateLimitConfig {
            requests_per_minute: 60,
            burst: 5,
            whitelist: HashSet::new(),
            max_tracked_clients: 3,
        });
        for client in ["a", "b", "c"] {
            assert!(limiter.admit(client).await);
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        // a 再次活动后，最久未活动的是 b
        assert!(limiter.admit("a").await);
        assert!(limiter.admit("d").await);

        let buckets = limiter.buckets.lock().await;
        assert!(!buckets.buckets.contains_key("b"));
        for client in ["a", "c", "d"] {
            assert!(buckets.buckets.contains_key(client), "{} 应保留", client);
        }
        assert_eq!(buckets.recency.len(), buckets.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_table_eviction_keeps_index_consistent() {
        let limiter = RateLimitService::new(&RateLimitConfig {
            requests_per_minute: 60,
            burst: 5,
            whitelist: HashSet::new(),
            max_tracked_clients: 10_000,
        });
        for i in 0..25_000 {
            assert!(limiter.admit(&format!("client-{}", i)).await);
        }
        let buckets = limiter.buckets.lock().await;
        assert_eq!(buckets.len(), 10_000);
        assert_eq!(buckets.recency.len(), 10_000);
        assert!(buckets.buckets.contains_key("client-24999"));
        assert!(!buckets.buckets.contains_key("client-14999"));
    }

    #[tokio::test]
    async fn test_concurrent_admission_is_exact() {
        let limiter = Arc::new(service(1, 5));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.admit("shared").await }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5, "并发下放行数量应等于桶容量");
    }
}
