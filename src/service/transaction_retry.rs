// 交易广播重试策略
//
// 提供：
// - 最大尝试次数
// - 指数退避（带上限）

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 交易重试配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 最大尝试次数（包含首次发送）
    pub max_attempts: u32,
    /// 初始退避时间（毫秒）
    pub initial_backoff_ms: u64,
    /// 退避倍数
    pub backoff_multiplier: f64,
    /// 单次退避上限（毫秒）
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next_ms: self.initial_backoff_ms,
            multiplier: self.backoff_multiplier.max(1.0),
            max_ms: self.max_backoff_ms,
        }
    }

    /// 第 `attempt` 次尝试之后是否还允许继续尝试（attempt 从 1 开始）
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// 指数退避序列
#[derive(Debug, Clone)]
pub struct Backoff {
    next_ms: u64,
    multiplier: f64,
    max_ms: u64,
}

impl Backoff {
    /// 返回下一次等待时长，并推进序列
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next_ms.min(self.max_ms);
        self.next_ms = ((current as f64) * self.multiplier).min(self.max_ms as f64) as u64;
        Duration::from_millis(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_backoff_ms, 500);
        assert!(config.can_retry(3));
        assert!(!config.can_retry(4));
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let mut backoff = RetryConfig::default().backoff();
        let delays: Vec<u64> = (0..6)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![500, 1_000, 2_000, 4_000, 8_000, 8_000]);
    }

    #[test]
    fn test_backoff_multiplier_below_one_is_flat() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 10,
            backoff_multiplier: 0.5,
            max_backoff_ms: 100,
        };
        let mut backoff = config.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }
}
