//! 分区化幂等存储实现。
//!
//! - [`sqlite::SqliteSeriesStore`]：一个分区一个 SQLite 文件，适合单机与测试。
//! - [`postgres::PgSeriesStore`]：一个分区一张表，可选转换为 TimescaleDB hypertable。

pub mod postgres;
pub mod sqlite;

use collector_core::config::{DatabaseConfig, StorageBackend};
use collector_core::store::error::StoreError;
use collector_core::store::port::SeriesStore;
use std::sync::Arc;

/// # Summary
/// 按配置选择并初始化存储后端。
///
/// # Arguments
/// * `config`: 数据库配置。
///
/// # Returns
/// 成功返回动态分发的存储实例。
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn SeriesStore>, StoreError> {
    match config.backend {
        StorageBackend::Postgres => Ok(Arc::new(postgres::PgSeriesStore::connect(config).await?)),
        StorageBackend::Sqlite => Ok(Arc::new(sqlite::SqliteSeriesStore::new(&config.data_dir)?)),
    }
}

/// # Summary
/// 将 sqlx 错误映射为存储层错误分类。
///
/// # Logic
/// 1. I/O、连接池、TLS、协议类错误视为存储暂不可用（可重试）。
/// 2. 约束类数据库错误视为数据不合法（致命）。
/// 3. 结果解码类错误说明分区结构不符（致命）。
/// 4. 其余数据库错误（如锁竞争）可重试。
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_) => StoreError::Unavailable(err.to_string()),
        sqlx::Error::Database(db) if is_missing_table(db.code().as_deref(), db.message()) => {
            StoreError::PartitionMissing(format!("partition table is gone: {}", err))
        }
        sqlx::Error::Database(db) => match db.kind() {
            sqlx::error::ErrorKind::CheckViolation
            | sqlx::error::ErrorKind::NotNullViolation
            | sqlx::error::ErrorKind::ForeignKeyViolation => StoreError::Malformed(err.to_string()),
            _ => StoreError::Database(err.to_string()),
        },
        sqlx::Error::Configuration(_) | sqlx::Error::InvalidArgument(_) => {
            StoreError::InitError(err.to_string())
        }
        sqlx::Error::RowNotFound => StoreError::Partition(format!("unexpected empty result: {}", err)),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => {
            StoreError::Partition(format!("schema mismatch: {}", err))
        }
        _ => StoreError::Database(err.to_string()),
    }
}

// 分区表或分区文件在运行期间被删除：Postgres 42P01，SQLite "no such table"
fn is_missing_table(code: Option<&str>, message: &str) -> bool {
    code == Some("42P01") || message.starts_with("no such table")
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::common::ErrorKind;

    #[test]
    fn test_pool_exhaustion_is_retryable() {
        let err = classify(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_unrecoverable_errors_are_fatal() {
        let cases = [
            sqlx::Error::Configuration("invalid port".into()),
            sqlx::Error::InvalidArgument("bad url".into()),
            sqlx::Error::RowNotFound,
        ];
        for err in cases {
            assert_eq!(classify(err).kind(), ErrorKind::Fatal);
        }
    }

    #[test]
    fn test_missing_table_detection() {
        assert!(is_missing_table(Some("42P01"), "relation \"candles_btc_usd\" does not exist"));
        assert!(is_missing_table(Some("1"), "no such table: bars"));
        assert!(!is_missing_table(Some("5"), "database is locked"));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let err = classify(sqlx::Error::ColumnNotFound("close".into()));
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}
