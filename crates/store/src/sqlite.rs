use crate::classify;
use async_trait::async_trait;
use collector_core::common::{PartitionName, SeriesIdentity};
use collector_core::market::entity::Bar;
use collector_core::store::error::StoreError;
use collector_core::store::port::SeriesStore;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// SeriesStore 的 SQLite 实现，采用“一库一分区”策略。
///
/// # Summary
/// 为每个分区维护一个独立的 SQLite 数据库文件，以实现物理数据隔离。
///
/// # Invariants
/// * 数据库文件存储在 `base_path` 目录下，文件名为 `{partition}.db`。
/// * 连接池按分区缓存；只有经过 `ensure_partition` 的分区才允许写入。
/// * 不同分区使用不同文件与连接池，写入互不阻塞。
pub struct SqliteSeriesStore {
    base_path: PathBuf,
    pools: DashMap<PartitionName, SqlitePool>,
}

impl SqliteSeriesStore {
    /// 创建新的 SqliteSeriesStore 实例。
    ///
    /// # Logic
    /// 1. 确保数据目录存在。
    ///
    /// # Arguments
    /// * `base_path` - 存放分区数据库文件的目录。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例或错误。
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_path = base_path.as_ref().to_path_buf();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path).map_err(|e| StoreError::InitError(e.to_string()))?;
        }
        Ok(Self {
            base_path,
            pools: DashMap::new(),
        })
    }

    /// 分区对应的数据库文件路径。
    pub fn partition_path(&self, partition: &PartitionName) -> PathBuf {
        self.base_path.join(format!("{}.db", partition))
    }

    fn pool(&self, partition: &PartitionName) -> Result<SqlitePool, StoreError> {
        self.pools
            .get(partition)
            .map(|p| p.clone())
            .ok_or_else(|| StoreError::PartitionMissing(partition.to_string()))
    }

    /// 打开（必要时创建）分区数据库并初始化表结构。
    ///
    /// # Logic
    /// 1. 配置 `create_if_missing`、WAL 日志与忙等待超时。
    /// 2. 每个分区仅一个连接，同分区写入排队执行。
    /// 3. 创建 `bars` 表，主键为 `(bucket, ts)`。
    async fn open_partition(&self, partition: &PartitionName) -> Result<SqlitePool, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(self.partition_path(partition))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        // 单连接：同一分区的事务天然串行，避免 WAL 下的写锁升级冲突
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Partition(e.to_string()))?;

        // 价格以十进制文本保存，避免 REAL 带来的精度损失
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bars (
                bucket TEXT NOT NULL,
                ts INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                PRIMARY KEY (bucket, ts)
            ) WITHOUT ROWID;
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Partition(e.to_string()))?;

        Ok(pool)
    }
}

fn decode_decimal(raw: &str, field: &str, ts: i64) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw)
        .map_err(|e| StoreError::Malformed(format!("stored {} at {} is not decimal: {}", field, ts, e)))
}

#[async_trait]
impl SeriesStore for SqliteSeriesStore {
    async fn ensure_partition(&self, series: &SeriesIdentity) -> Result<(), StoreError> {
        let partition = series.partition();
        if self.pools.contains_key(partition) {
            return Ok(());
        }

        let pool = self.open_partition(partition).await?;
        // 并发初始化时保留先到者的连接池
        self.pools.entry(partition.clone()).or_insert(pool);
        info!(partition = %partition, path = %self.partition_path(partition).display(), "partition ready");
        Ok(())
    }

    /// # Summary
    /// 在单个事务中批量写入 K 线。
    ///
    /// # Logic
    /// 1. 获取分区连接池并开启事务。
    /// 2. 逐根校验后执行 `INSERT ... ON CONFLICT DO NOTHING`，累计新插入行数。
    /// 3. 任一步失败时事务随 drop 回滚；全部成功后提交。
    async fn write_page(&self, series: &SeriesIdentity, bars: &[Bar]) -> Result<u64, StoreError> {
        let pool = self.pool(series.partition())?;
        let bucket = series.timeframe().to_string();

        let mut tx = pool.begin().await.map_err(classify)?;
        let mut inserted = 0u64;

        for bar in bars {
            bar.check_integrity().map_err(StoreError::Malformed)?;

            let result = sqlx::query(
                r#"
                INSERT INTO bars (bucket, ts, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (bucket, ts) DO NOTHING
                "#,
            )
            .bind(&bucket)
            .bind(bar.timestamp)
            .bind(bar.open.to_string())
            .bind(bar.high.to_string())
            .bind(bar.low.to_string())
            .bind(bar.close.to_string())
            .bind(bar.volume.to_string())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(classify)?;
        debug!(series = %series, bars = bars.len(), inserted, "page committed");
        Ok(inserted)
    }

    async fn load_bars(
        &self,
        series: &SeriesIdentity,
        from: i64,
        to: i64,
    ) -> Result<Vec<Bar>, StoreError> {
        let pool = self.pool(series.partition())?;
        let bucket = series.timeframe().to_string();

        let records = sqlx::query_as::<_, (i64, String, String, String, String, String)>(
            r#"
            SELECT ts, open, high, low, close, volume
            FROM bars
            WHERE bucket = ? AND ts >= ? AND ts <= ?
            ORDER BY ts ASC
            "#,
        )
        .bind(&bucket)
        .bind(from)
        .bind(to)
        .fetch_all(&pool)
        .await
        .map_err(classify)?;

        records
            .into_iter()
            .map(|r| {
                Ok(Bar {
                    timestamp: r.0,
                    open: decode_decimal(&r.1, "open", r.0)?,
                    high: decode_decimal(&r.2, "high", r.0)?,
                    low: decode_decimal(&r.3, "low", r.0)?,
                    close: decode_decimal(&r.4, "close", r.0)?,
                    volume: decode_decimal(&r.5, "volume", r.0)?,
                })
            })
            .collect()
    }
}
