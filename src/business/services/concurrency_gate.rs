//! 推理后端并发闸门
//!
//! 非阻塞的计数信号量：没有空闲槽位时立即拒绝，不排队。
//! 槽位以许可（permit）的形式持有，许可被丢弃时自动归还，
//! 因此无论成功、出错还是panic，槽位都不会泄漏。

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// 并发闸门
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

/// 已占用的槽位，丢弃即释放
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    /// 显式释放槽位
    pub fn release(self) {
        drop(self);
    }
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// 尝试占用一个槽位，已满时立即返回 None
    pub fn try_acquire(&self) -> Option<GatePermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                debug!(
                    "🔓 获取推理槽位成功: 剩余 {}/{}",
                    self.semaphore.available_permits(),
                    self.max_concurrent
                );
                Some(GatePermit { _permit: permit })
            }
            Err(_) => {
                warn!("⚠️ 推理槽位已满 ({}), 拒绝请求", self.max_concurrent);
                None
            }
        }
    }

    /// 当前空闲槽位数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 当前占用槽位数
    pub fn in_use(&self) -> usize {
        self.max_concurrent.saturating_sub(self.available())
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_exactness() {
        let gate = ConcurrencyGate::new(2);

        let first = gate.try_acquire();
        let second = gate.try_acquire();
        let third = gate.try_acquire();
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(third.is_none(), "第三次获取应立即失败");

        first.unwrap().release();
        assert!(gate.try_acquire().is_some(), "释放后第四次获取应成功");
    }

    #[test]
    fn test_permit_drop_releases_slot() {
        let gate = ConcurrencyGate::new(1);
        {
            let _permit = gate.try_acquire().unwrap();
            assert_eq!(gate.available(), 0);
            assert_eq!(gate.in_use(), 1);
        }
        assert_eq!(gate.available(), 1, "作用域结束后槽位应归还");
    }

    #[test]
    fn test_zero_capacity_always_saturated() {
        let gate = ConcurrencyGate::new(0);
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.in_use(), 0);
    }

    #[tokio::test]
    async fn test_slot_released_on_panic() {
        let gate = ConcurrencyGate::new(1);
        let permit = gate.try_acquire().unwrap();

        let result = tokio::spawn(async move {
            let _held = permit;
            panic!("模拟处理过程中的panic");
        })
        .await;

        assert!(result.is_err());
        assert_eq!(gate.available(), 1, "panic后槽位不应泄漏");
    }

    #[tokio::test]
    async fn test_concurrent_acquire_never_exceeds_capacity() {
        let gate = ConcurrencyGate::new(3);
        let mut permits = Vec::new();
        for _ in 0..10 {
            if let Some(permit) = gate.try_acquire() {
                permits.push(permit);
            }
        }
        assert_eq!(permits.len(), 3);
        permits.clear();
        assert_eq!(gate.available(), 3);
    }
}
