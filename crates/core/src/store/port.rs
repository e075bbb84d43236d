use super::error::StoreError;
use crate::common::SeriesIdentity;
use crate::market::entity::Bar;
use async_trait::async_trait;

/// # Summary
/// 序列存储接口，负责分区生命周期与幂等写入。
///
/// # Invariants
/// - 每个标的对应一个独立的物理分区，分区名来自 `SeriesIdentity::partition`。
/// - 行键为 `(周期, 时间戳)`；同键重复写入静默忽略，先写者胜出。
/// - 单次 `write_page` 要么整体可见，要么完全不可见。
/// - 不同分区之间的写入互不阻塞。
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// # Summary
    /// 确保序列所属的分区存在。
    ///
    /// # Logic
    /// 1. 若分区不存在则创建（表结构、主键、可选的时序扩展）。
    /// 2. 若已存在则不做任何修改，因此每次运行都可以安全调用。
    ///
    /// # Arguments
    /// * `series`: 目标序列。
    ///
    /// # Returns
    /// 成功返回 Ok；失败返回 `StoreError::Partition` 等致命错误。
    async fn ensure_partition(&self, series: &SeriesIdentity) -> Result<(), StoreError>;

    /// # Summary
    /// 在单个事务中写入一页 K 线。
    ///
    /// # Logic
    /// 1. 开启事务。
    /// 2. 逐根校验并以冲突忽略语义插入。
    /// 3. 任一失败则回滚整页；全部成功后提交。
    ///
    /// # Arguments
    /// * `series`: 目标序列。
    /// * `bars`: 待写入的 K 线（顺序不限）。
    ///
    /// # Returns
    /// 成功返回本次新插入的行数（已存在的键不计入）。
    async fn write_page(&self, series: &SeriesIdentity, bars: &[Bar]) -> Result<u64, StoreError>;

    /// # Summary
    /// 读取闭区间 `[from, to]`（毫秒）内的 K 线，按时间升序返回。
    async fn load_bars(
        &self,
        series: &SeriesIdentity,
        from: i64,
        to: i64,
    ) -> Result<Vec<Bar>, StoreError>;
}
