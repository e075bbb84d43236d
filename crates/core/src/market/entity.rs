use crate::common::Cursor;
use crate::market::error::MarketError;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 单根 K 线数据实体，记录特定时段内的行情波动。
///
/// # Invariants
/// - 去重身份仅由 `(series, timestamp)` 决定，价格字段不参与。
/// - 价格与成交量使用十进制定点数，避免浮点误差写入历史数据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    // K 线开始时间，毫秒时间戳
    pub timestamp: i64,
    // 开盘价
    pub open: Decimal,
    // 最高价
    pub high: Decimal,
    // 最低价
    pub low: Decimal,
    // 收盘价
    pub close: Decimal,
    // 成交量
    pub volume: Decimal,
}

impl Bar {
    /// K 线开始时间的 UTC 表示，超出可表示范围时返回 None。
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    /// # Summary
    /// 检查 K 线在写入前是否自洽。
    ///
    /// # Logic
    /// 1. 时间戳必须为正且可转换为 UTC 时间。
    /// 2. 价格与成交量不能为负。
    /// 3. `high` 不能低于 `low`。
    ///
    /// # Returns
    /// 通过返回 Ok，否则返回描述问题的文本。
    pub fn check_integrity(&self) -> Result<(), String> {
        if self.timestamp <= 0 || self.time().is_none() {
            return Err(format!("timestamp {} is out of range", self.timestamp));
        }
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(format!(
                    "{} is negative ({}) at timestamp {}",
                    field, value, self.timestamp
                ));
            }
        }
        if self.high < self.low {
            return Err(format!(
                "high {} is below low {} at timestamp {}",
                self.high, self.low, self.timestamp
            ));
        }
        Ok(())
    }
}

/// # Summary
/// 一次上游请求返回的一页数据。
///
/// # Invariants
/// - `bars` 严格按时间从新到旧排列。
/// - `next` 为 None 当且仅当本页为空，表示没有更早的数据。
/// - `next` 由本页最旧（最后）一根 K 线推导。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    bars: Vec<Bar>,
    next: Option<Cursor>,
}

impl Page {
    /// 空页，翻页终止信号。
    pub fn empty() -> Self {
        Self {
            bars: Vec::new(),
            next: None,
        }
    }

    /// # Summary
    /// 由上游按从新到旧顺序交付的 K 线构造一页。
    ///
    /// # Logic
    /// 1. 校验时间戳严格递减，否则整页视为可疑数据。
    /// 2. 以最后一根 K 线的时间戳作为下一次请求的游标。
    ///
    /// # Arguments
    /// * `bars`: 从新到旧排列的 K 线。
    ///
    /// # Returns
    /// 成功返回 Page；顺序错误返回 `MarketError::Parse`。
    pub fn from_newest_first(bars: Vec<Bar>) -> Result<Self, MarketError> {
        if let Some(i) = bars
            .windows(2)
            .position(|w| w[0].timestamp <= w[1].timestamp)
        {
            return Err(MarketError::Parse(format!(
                "bars are not strictly newest-first at row {} ({} then {})",
                i + 1,
                bars[i].timestamp,
                bars[i + 1].timestamp
            )));
        }
        let next = bars.last().map(|b| Cursor::Before(b.timestamp));
        Ok(Self { bars, next })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn next(&self) -> Option<Cursor> {
        self.next
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
