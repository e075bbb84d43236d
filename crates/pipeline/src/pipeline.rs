use crate::limiter::{LimiterError, RateLimiter};
use crate::retry::RetryPolicy;
use crate::shutdown::Shutdown;
use collector_core::common::{Cursor, ErrorKind, SeriesIdentity};
use collector_core::market::entity::Page;
use collector_core::market::error::MarketError;
use collector_core::market::port::MarketDataProvider;
use collector_core::store::error::StoreError;
use collector_core::store::port::SeriesStore;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// 可重试的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Persist => write!(f, "persist"),
        }
    }
}

/// # Summary
/// 一次流水线运行的终止原因。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// 分区创建失败
    #[error("Partition setup failed: {0}")]
    Partition(StoreError),
    /// 抓取失败（未重试或不可重试）
    #[error("Fetch failed: {0}")]
    Fetch(MarketError),
    /// 写入失败（未重试或不可重试）
    #[error("Persist failed: {0}")]
    Persist(StoreError),
    /// 限流器拒绝
    #[error("Rate limiter error: {0}")]
    Limiter(LimiterError),
    /// 瞬时错误重试耗尽
    #[error("{stage} gave up after {attempts} attempts: {source}")]
    Exhausted {
        stage: Stage,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },
    /// 上游返回的续页游标没有严格向过去移动
    #[error("Cursor stalled: {next} is not older than {current}")]
    CursorStalled { current: Cursor, next: Cursor },
    /// 收到关闭信号
    #[error("Cancelled by shutdown signal")]
    Cancelled,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Partition(_) => ErrorKind::Fatal,
            PipelineError::Fetch(e) => e.kind(),
            PipelineError::Persist(e) => e.kind(),
            PipelineError::Limiter(e) => e.kind(),
            PipelineError::Exhausted { .. } | PipelineError::CursorStalled { .. } => ErrorKind::Fatal,
            PipelineError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<LimiterError> for PipelineError {
    fn from(err: LimiterError) -> Self {
        match err {
            LimiterError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Limiter(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    Failed,
    Cancelled,
}

impl RunOutcome {
    /// 进程退出码：Done 0，Failed 1，Cancelled 130。
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Done => 0,
            RunOutcome::Failed => 1,
            RunOutcome::Cancelled => 130,
        }
    }
}

/// # Summary
/// 单次运行的结果汇总。
///
/// # Invariants
/// - `last_cursor` 只在整页写入确认后推进，可直接作为下次运行的起点。
/// - `bars_persisted` 统计已提交页中的全部 K 线，`rows_inserted` 只统计新插入的行。
#[derive(Debug, Clone)]
pub struct RunReport {
    pub series: SeriesIdentity,
    pub outcome: RunOutcome,
    pub pages: usize,
    pub bars_persisted: usize,
    pub rows_inserted: u64,
    pub last_cursor: Cursor,
    pub error: Option<PipelineError>,
}

impl RunReport {
    fn started(series: &SeriesIdentity, start: Cursor) -> Self {
        Self {
            series: series.clone(),
            outcome: RunOutcome::Done,
            pages: 0,
            bars_persisted: 0,
            rows_inserted: 0,
            last_cursor: start,
            error: None,
        }
    }
}

/// # Summary
/// 单序列的向后翻页摄取流水线。
///
/// # Logic
/// 1. `Start`：确保分区存在，游标置为起点。
/// 2. `Fetching`：获取许可并抓取一页；瞬时错误按退避重试，每次重试重新获取许可。
/// 3. 空页或只含边界重叠 K 线的页结束为 `Done`；否则校验续页游标严格更旧，进入 `Persisting`。
/// 4. `Persisting`：原样写入同一页，瞬时错误按退避重试；确认后推进游标，回到 `Fetching`。
///
/// # Invariants
/// - 同一时刻至多一个在途抓取和一个在途写入。
/// - 所有挂起点（许可、抓取、写入、退避）都与关闭信号竞速。
#[derive(Clone)]
pub struct IngestionPipeline {
    source: Arc<dyn MarketDataProvider>,
    store: Arc<dyn SeriesStore>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    page_size: usize,
    shutdown: Shutdown,
}

impl IngestionPipeline {
    /// 以数据源的最大页大小和默认重试策略创建流水线。
    pub fn new(
        source: Arc<dyn MarketDataProvider>,
        store: Arc<dyn SeriesStore>,
        limiter: Arc<RateLimiter>,
        shutdown: Shutdown,
    ) -> Self {
        let page_size = source.max_page_size();
        Self {
            source,
            store,
            limiter,
            retry: RetryPolicy::default(),
            page_size,
            shutdown,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 页大小超出数据源上限时，首次抓取即以致命错误失败。
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// # Summary
    /// 从 `start` 开始向过去摄取一个序列，直到数据耗尽、致命错误或取消。
    ///
    /// # Arguments
    /// * `series`: 目标序列。
    /// * `start`: 起始游标，通常为 `Cursor::Latest`，或上次失败运行的 `last_cursor`。
    ///
    /// # Returns
    /// 运行报告；失败与取消通过 `outcome` 和 `error` 表达，而不是 `Err`。
    pub async fn run(&self, series: &SeriesIdentity, start: Cursor) -> RunReport {
        let mut report = RunReport::started(series, start);
        info!(series = %series, start = %start, page_size = self.page_size, "ingestion started");

        match self.drive(series, start, &mut report).await {
            Ok(()) => {
                report.outcome = RunOutcome::Done;
                info!(
                    series = %series,
                    pages = report.pages,
                    bars = report.bars_persisted,
                    inserted = report.rows_inserted,
                    "ingestion done"
                );
            }
            Err(err) if err.kind() == ErrorKind::Cancelled => {
                report.outcome = RunOutcome::Cancelled;
                warn!(series = %series, cursor = %report.last_cursor, "ingestion cancelled");
                report.error = Some(err);
            }
            Err(err) => {
                report.outcome = RunOutcome::Failed;
                error!(series = %series, cursor = %report.last_cursor, error = %err, "ingestion failed");
                report.error = Some(err);
            }
        }
        report
    }

    async fn drive(
        &self,
        series: &SeriesIdentity,
        start: Cursor,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        self.cancellable(self.store.ensure_partition(series))
            .await?
            .map_err(PipelineError::Partition)?;

        let mut cursor = start;
        loop {
            let page = self
                .retrying(Stage::Fetch, || self.fetch_once(series, cursor))
                .await?;
            if page.is_empty() {
                return Ok(());
            }

            let next = page.next().unwrap_or(cursor);
            if !cursor.is_advanced_by(&next) {
                if is_boundary_only(&page, cursor) {
                    // 只剩与上一页重叠的边界 K 线，已经落盘
                    debug!(series = %series, cursor = %cursor, "only the boundary bar is left");
                    return Ok(());
                }
                return Err(PipelineError::CursorStalled { current: cursor, next });
            }

            let inserted = self
                .retrying(Stage::Persist, || self.persist_once(series, &page))
                .await?;

            // 写入已确认，游标才可推进
            cursor = next;
            report.pages += 1;
            report.bars_persisted += page.len();
            report.rows_inserted += inserted;
            report.last_cursor = cursor;
            info!(
                series = %series,
                bars = page.len(),
                inserted,
                cursor = %cursor,
                "page committed"
            );
        }
    }

    async fn fetch_once(&self, series: &SeriesIdentity, cursor: Cursor) -> Result<Page, PipelineError> {
        let _permit = self.limiter.acquire(&self.shutdown).await?;
        debug!(series = %series, cursor = %cursor, "fetching page");
        self.cancellable(self.source.fetch_page(series, self.page_size, cursor))
            .await?
            .map_err(PipelineError::Fetch)
    }

    async fn persist_once(&self, series: &SeriesIdentity, page: &Page) -> Result<u64, PipelineError> {
        self.cancellable(self.store.write_page(series, page.bars()))
            .await?
            .map_err(PipelineError::Persist)
    }

    /// # Summary
    /// 执行 `op`，瞬时错误按退避策略重试。
    ///
    /// # Logic
    /// 1. 成功、致命错误或取消直接返回。
    /// 2. 瞬时错误在次数未耗尽时等待退避后重试；等待可被关闭信号打断。
    /// 3. 次数耗尽返回 `Exhausted`，其 kind 为 Fatal。
    async fn retrying<T, F, Fut>(&self, stage: Stage, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.kind() == ErrorKind::Transient => err,
                Err(err) => return Err(err),
            };

            if attempt >= self.retry.max_attempts {
                return Err(PipelineError::Exhausted {
                    stage,
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.retry.delay(attempt - 1);
            warn!(
                stage = %stage,
                attempt,
                max_attempts = self.retry.max_attempts,
                delay = ?delay,
                error = %err,
                "transient failure, retrying"
            );
            self.cancellable(tokio::time::sleep(delay)).await?;
        }
    }

    /// 与关闭信号竞速；信号先到时丢弃 `fut`。
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, PipelineError> {
        if self.shutdown.is_triggered() {
            return Err(PipelineError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.shutdown.triggered() => Err(PipelineError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

/// 上游可能在下一页重复上一页最旧的一根；整页只有这一根时视为数据耗尽。
fn is_boundary_only(page: &Page, cursor: Cursor) -> bool {
    match cursor.upper_bound() {
        Some(bound) => page.bars().iter().all(|b| b.timestamp == bound),
        None => false,
    }
}
