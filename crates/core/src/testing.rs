//! 测试替身：脚本化数据源与内存存储。
//!
//! 仅在启用 `test-utils` feature 时编译，供各 crate 的集成测试复用。

use crate::common::{Cursor, PartitionName, SeriesIdentity, TimeFrame};
use crate::market::entity::{Bar, Page};
use crate::market::error::MarketError;
use crate::market::port::{MarketDataProvider, check_page_limit};
use crate::store::error::StoreError;
use crate::store::port::SeriesStore;
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

/// 生成 `count` 根从 `newest_ts` 开始、间隔 `step_ms` 向过去排列的 K 线。
pub fn descending_bars(newest_ts: i64, count: usize, step_ms: i64) -> Vec<Bar> {
    let mut ts = newest_ts;
    let mut bars = Vec::with_capacity(count);
    for i in 0..count {
        let base = Decimal::from(100) + Decimal::from(i64::try_from(i % 50).unwrap_or(0));
        bars.push(Bar {
            timestamp: ts,
            open: base,
            high: base + Decimal::ONE,
            low: base - Decimal::ONE,
            close: base + Decimal::new(5, 1),
            volume: Decimal::new(1_234, 2),
        });
        ts -= step_ms;
    }
    bars
}

/// # Summary
/// 按预设脚本依次返回结果的数据源。
///
/// # Invariants
/// - 脚本耗尽后返回空页。
/// - 记录每次调用收到的游标，便于断言翻页顺序。
pub struct ScriptedProvider {
    // 预设的响应队列
    responses: Mutex<VecDeque<Result<Page, MarketError>>>,
    // 每次调用收到的游标
    cursors: Mutex<Vec<Cursor>>,
    max_page_size: usize,
    // 每次调用前的人为延迟
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(max_page_size: usize) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            cursors: Mutex::new(Vec::new()),
            max_page_size,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push_page(&self, page: Page) {
        self.responses.lock().await.push_back(Ok(page));
    }

    pub async fn push_error(&self, err: MarketError) {
        self.responses.lock().await.push_back(Err(err));
    }

    /// 依次收到的游标
    pub async fn requested_cursors(&self) -> Vec<Cursor> {
        self.cursors.lock().await.clone()
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    async fn fetch_page(
        &self,
        _series: &SeriesIdentity,
        limit: usize,
        cursor: Cursor,
    ) -> Result<Page, MarketError> {
        check_page_limit(limit, self.max_page_size)?;
        self.cursors.lock().await.push(cursor);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Page::empty()))
    }
}

type PartitionRows = BTreeMap<(TimeFrame, i64), Bar>;

/// # Summary
/// 基于 DashMap 的内存序列存储，可注入写入失败。
///
/// # Invariants
/// - 一页内任一 K 线不合法时整页不写入。
/// - 同键先写者胜出。
#[derive(Default)]
pub struct MemSeriesStore {
    partitions: DashMap<PartitionName, PartitionRows>,
    // 下一次 ensure_partition 返回的错误
    ensure_failure: Mutex<Option<StoreError>>,
    // 后续 write_page 依次返回的错误
    write_failures: Mutex<VecDeque<StoreError>>,
    // 所有写入尝试（含失败的）
    write_attempts: Mutex<Vec<Vec<Bar>>>,
    // 每次写入在提交前挂起的时长
    write_delay: Option<Duration>,
}

impl MemSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入在校验后、提交前挂起 `delay`，用于模拟在途事务。
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub async fn fail_ensure_with(&self, err: StoreError) {
        *self.ensure_failure.lock().await = Some(err);
    }

    pub async fn fail_next_write_with(&self, err: StoreError) {
        self.write_failures.lock().await.push_back(err);
    }

    pub async fn write_attempts(&self) -> Vec<Vec<Bar>> {
        self.write_attempts.lock().await.clone()
    }

    pub fn has_partition(&self, name: &str) -> bool {
        self.partitions.iter().any(|p| p.key().as_str() == name)
    }

    /// 指定分区内所有行数（跨周期）。
    pub fn row_count(&self, partition: &PartitionName) -> usize {
        self.partitions.get(partition).map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SeriesStore for MemSeriesStore {
    async fn ensure_partition(&self, series: &SeriesIdentity) -> Result<(), StoreError> {
        if let Some(err) = self.ensure_failure.lock().await.take() {
            return Err(err);
        }
        self.partitions.entry(series.partition().clone()).or_default();
        Ok(())
    }

    async fn write_page(&self, series: &SeriesIdentity, bars: &[Bar]) -> Result<u64, StoreError> {
        self.write_attempts.lock().await.push(bars.to_vec());
        if let Some(err) = self.write_failures.lock().await.pop_front() {
            return Err(err);
        }

        for bar in bars {
            bar.check_integrity().map_err(StoreError::Malformed)?;
        }
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }

        let mut partition = self
            .partitions
            .get_mut(series.partition())
            .ok_or_else(|| StoreError::PartitionMissing(series.partition().to_string()))?;

        let mut inserted = 0u64;
        for bar in bars {
            let key = (series.timeframe(), bar.timestamp);
            if let std::collections::btree_map::Entry::Vacant(slot) = partition.entry(key) {
                slot.insert(bar.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn load_bars(
        &self,
        series: &SeriesIdentity,
        from: i64,
        to: i64,
    ) -> Result<Vec<Bar>, StoreError> {
        let partition = self
            .partitions
            .get(series.partition())
            .ok_or_else(|| StoreError::PartitionMissing(series.partition().to_string()))?;
        if from > to {
            return Ok(Vec::new());
        }
        let tf = series.timeframe();
        Ok(partition
            .range((tf, from)..=(tf, to))
            .map(|(_, bar)| bar.clone())
            .collect())
    }
}
