use crate::common::ErrorKind;
use thiserror::Error;

/// # Summary
/// 存储层错误枚举，处理数据库连接、读写失败等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 可重试与不可重试的失败必须落在不同的变体上。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 存储暂不可用：I/O、连接池超时、锁竞争、连接断开
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    /// 数据库操作失败
    #[error("Database error: {0}")]
    Database(String),
    /// 待写入的数据不合法
    #[error("Malformed bar: {0}")]
    Malformed(String),
    /// 分区创建失败
    #[error("Partition error: {0}")]
    Partition(String),
    /// 分区尚未通过 ensure_partition 初始化
    #[error("Partition {0} has not been ensured")]
    PartitionMissing(String),
    /// 初始化存储失败
    #[error("Initialization error: {0}")]
    InitError(String),
}

impl StoreError {
    /// 可重试性分类：仅存储不可用与一般数据库错误可重试。
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unavailable(_) | StoreError::Database(_) => ErrorKind::Transient,
            StoreError::Malformed(_)
            | StoreError::Partition(_)
            | StoreError::PartitionMissing(_)
            | StoreError::InitError(_) => ErrorKind::Fatal,
        }
    }
}
