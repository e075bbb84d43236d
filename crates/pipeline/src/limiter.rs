use crate::shutdown::Shutdown;
use collector_core::common::ErrorKind;
use collector_core::config::LimiterConfig;
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;
use thiserror::Error;

/// # Summary
/// 限流器错误。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// 等待许可期间收到关闭信号，未消耗任何令牌
    #[error("Cancelled while waiting for a permit")]
    Cancelled,
    /// rate 或 burst 为零
    #[error("Invalid quota: rate={rate}, burst={burst}")]
    InvalidQuota { rate: u32, burst: u32 },
}

impl LimiterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LimiterError::Cancelled => ErrorKind::Cancelled,
            LimiterError::InvalidQuota { .. } => ErrorKind::Fatal,
        }
    }
}

/// 一次上游调用的许可。
#[must_use = "a permit authorises exactly one upstream call"]
#[derive(Debug)]
pub struct Permit {
    _private: (),
}

/// # Summary
/// 令牌桶限流器，在所有共享实例的调用方之间限制出站请求速率。
///
/// # Invariants
/// - 长期平均每秒不超过 `rate` 个许可，桶满时最多立即发放 `burst` 个。
/// - 令牌状态由 GCRA 原子更新，并发调用方不会合计超出 `burst`。
/// - 令牌只在许可真正发放时消耗；取消的等待不占用令牌。
#[derive(Debug)]
pub struct RateLimiter {
    inner: DefaultDirectRateLimiter,
    rate: NonZeroU32,
    burst: NonZeroU32,
}

impl RateLimiter {
    /// # Summary
    /// 创建限流器。
    ///
    /// # Arguments
    /// * `rate`: 每秒许可数。
    /// * `burst`: 桶容量。
    ///
    /// # Returns
    /// 任一参数为零时返回 `LimiterError::InvalidQuota`。
    pub fn new(rate: u32, burst: u32) -> Result<Self, LimiterError> {
        let (Some(r), Some(b)) = (NonZeroU32::new(rate), NonZeroU32::new(burst)) else {
            return Err(LimiterError::InvalidQuota { rate, burst });
        };
        let quota = Quota::per_second(r).allow_burst(b);
        Ok(Self {
            inner: DefaultDirectRateLimiter::direct(quota),
            rate: r,
            burst: b,
        })
    }

    pub fn from_config(config: &LimiterConfig) -> Result<Self, LimiterError> {
        Self::new(config.rate, config.burst)
    }

    pub fn rate(&self) -> u32 {
        self.rate.get()
    }

    pub fn burst(&self) -> u32 {
        self.burst.get()
    }

    /// 不等待地尝试获取许可。
    pub fn try_acquire(&self) -> Option<Permit> {
        self.inner.check().ok().map(|_| Permit { _private: () })
    }

    /// # Summary
    /// 获取一个许可，必要时挂起等待。
    ///
    /// # Logic
    /// 1. 已触发关闭时立即返回 Cancelled。
    /// 2. 否则与关闭信号竞速等待令牌；关闭先到则放弃等待，不消耗令牌。
    pub async fn acquire(&self, shutdown: &Shutdown) -> Result<Permit, LimiterError> {
        if shutdown.is_triggered() {
            return Err(LimiterError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = shutdown.triggered() => Err(LimiterError::Cancelled),
            _ = self.inner.until_ready() => Ok(Permit { _private: () }),
        }
    }
}
