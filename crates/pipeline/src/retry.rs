//! 带上限的指数退避重试策略。

use collector_core::config::RetryConfig;
use std::time::Duration;

/// # Summary
/// 重试策略：第 n 次重试前等待 `base * factor^n`，不超过 `max_delay`。
///
/// # Invariants
/// - `max_attempts` 含首次尝试，至少为 1。
/// - `factor` 不小于 1.0，延迟单调不减。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// 由配置构造，并把非法取值收敛到合法范围。
    pub fn from_config(config: &RetryConfig) -> Self {
        let factor = if config.factor.is_finite() && config.factor >= 1.0 {
            config.factor
        } else {
            1.0
        };
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            factor,
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.base_delay_ms)),
        }
    }

    /// 固定短延迟，便于测试。
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            factor: 1.0,
            max_delay: delay,
        }
    }

    /// 第 `retry` 次重试（从 0 开始）前的等待时长。
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let seconds = self.base_delay.as_secs_f64() * self.factor.powi(exp);
        let capped = seconds.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }
}
