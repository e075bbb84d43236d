use crate::common::{Cursor, SeriesIdentity};
use crate::market::entity::Page;
use crate::market::error::MarketError;
use async_trait::async_trait;

/// # Summary
/// 分页历史 K 线数据源接口（原始数据源）。
///
/// # Invariants
/// - 返回的页内 K 线严格从新到旧排列，`next` 由最旧一根推导。
/// - 空页代表没有更早的数据，而不是错误。
/// - 任何一条记录无法解析时整页失败，不得丢弃或以零值填充。
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// # Summary
    /// 单次请求允许的最大条数（上游硬上限）。
    fn max_page_size(&self) -> usize;

    /// # Summary
    /// 获取特定序列在游标之前的一页 K 线。
    ///
    /// # Logic
    /// 1. 校验 `limit` 位于 `1..=max_page_size()`，否则直接拒绝（不做截断）。
    /// 2. 构建数据源请求并执行。
    /// 3. 解析响应并按错误分类返回。
    ///
    /// # Arguments
    /// * `series`: 序列身份（标的 + 周期）。
    /// * `limit`: 页大小。
    /// * `cursor`: 翻页游标，`Latest` 表示从最新数据开始。
    ///
    /// # Returns
    /// 成功返回 Page，失败返回 MarketError。
    async fn fetch_page(
        &self,
        series: &SeriesIdentity,
        limit: usize,
        cursor: Cursor,
    ) -> Result<Page, MarketError>;
}

/// # Summary
/// 校验页大小是否位于 `1..=max`，供各数据源实现共用。
pub fn check_page_limit(limit: usize, max: usize) -> Result<(), MarketError> {
    if limit == 0 || limit > max {
        return Err(MarketError::InvalidRequest(format!(
            "limit {} outside 1..={}",
            limit, max
        )));
    }
    Ok(())
}
