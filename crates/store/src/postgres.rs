use crate::classify;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use collector_core::common::{PartitionName, SeriesIdentity};
use collector_core::config::DatabaseConfig;
use collector_core::market::entity::Bar;
use collector_core::store::error::StoreError;
use collector_core::store::port::SeriesStore;
use dashmap::DashSet;
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::str::FromStr;
use tracing::{debug, info};

/// # Summary
/// SeriesStore 的 PostgreSQL 实现，一个分区一张表。
///
/// # Invariants
/// - 表名为 `candles_{partition}`，分区名只含 `[a-z0-9_]`，可直接拼入 SQL。
/// - `timescale` 开启时每张表都会被转换为以 `time` 为维度的 hypertable。
/// - 只有经过 `ensure_partition` 的分区才允许写入。
pub struct PgSeriesStore {
    pool: PgPool,
    timescale: bool,
    // 本实例已确认存在的分区
    ready: DashSet<PartitionName>,
}

impl PgSeriesStore {
    /// # Summary
    /// 按配置建立连接池。
    ///
    /// # Logic
    /// 1. 解析 sslmode（disable / allow / prefer / require / verify-ca / verify-full）。
    /// 2. 以结构化选项而非拼接字符串构建连接参数。
    /// 3. 建立连接池。
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let ssl_mode = PgSslMode::from_str(&config.sslmode)
            .map_err(|e| StoreError::InitError(format!("invalid sslmode {:?}: {}", config.sslmode, e)))?;

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.dbname)
            .ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        info!(conn = %config.redacted_connection_string(), "connected to postgres");
        Ok(Self::from_pool(pool, config.timescale))
    }

    /// 使用已有连接池创建实例。
    pub fn from_pool(pool: PgPool, timescale: bool) -> Self {
        Self {
            pool,
            timescale,
            ready: DashSet::new(),
        }
    }

    /// 分区对应的表名。
    pub fn table_name(partition: &PartitionName) -> String {
        format!("candles_{}", partition)
    }

    fn table_for(&self, series: &SeriesIdentity) -> Result<String, StoreError> {
        let partition = series.partition();
        if !self.ready.contains(partition) {
            return Err(StoreError::PartitionMissing(partition.to_string()));
        }
        Ok(Self::table_name(partition))
    }
}

fn millis_to_utc(ts: i64, fallback: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts).single().unwrap_or(fallback)
}

#[async_trait]
impl SeriesStore for PgSeriesStore {
    /// # Summary
    /// 确保分区表（及 hypertable）存在。
    ///
    /// # Logic
    /// 1. `CREATE TABLE IF NOT EXISTS`，主键 `(bucket, time)`。
    /// 2. 开启 timescale 时调用 `create_hypertable(..., if_not_exists => TRUE)`。
    async fn ensure_partition(&self, series: &SeriesIdentity) -> Result<(), StoreError> {
        let partition = series.partition();
        if self.ready.contains(partition) {
            return Ok(());
        }
        let table = Self::table_name(partition);

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                bucket TEXT NOT NULL,
                time TIMESTAMPTZ NOT NULL,
                open NUMERIC NOT NULL,
                high NUMERIC NOT NULL,
                low NUMERIC NOT NULL,
                close NUMERIC NOT NULL,
                volume NUMERIC NOT NULL,
                PRIMARY KEY (bucket, time)
            );
            "#,
            table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Partition(format!("failed to create {}: {}", table, e)))?;

        if self.timescale {
            sqlx::query("SELECT create_hypertable($1::regclass, by_range('time'), if_not_exists => TRUE)")
                .bind(&table)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Partition(format!("failed to create hypertable {}: {}", table, e)))?;
        }

        self.ready.insert(partition.clone());
        info!(partition = %partition, table = %table, timescale = self.timescale, "partition ready");
        Ok(())
    }

    async fn write_page(&self, series: &SeriesIdentity, bars: &[Bar]) -> Result<u64, StoreError> {
        let table = self.table_for(series)?;
        let bucket = series.timeframe().to_string();
        let insert = format!(
            r#"
            INSERT INTO "{}" (bucket, time, open, high, low, close, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (bucket, time) DO NOTHING
            "#,
            table
        );

        let mut tx = self.pool.begin().await.map_err(classify)?;
        let mut inserted = 0u64;

        for bar in bars {
            bar.check_integrity().map_err(StoreError::Malformed)?;
            let time = bar
                .time()
                .ok_or_else(|| StoreError::Malformed(format!("timestamp {} is out of range", bar.timestamp)))?;

            let result = sqlx::query(&insert)
                .bind(&bucket)
                .bind(time)
                .bind(bar.open)
                .bind(bar.high)
                .bind(bar.low)
                .bind(bar.close)
                .bind(bar.volume)
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
        let table = self.table_for(series)?;
        let bucket = series.timeframe().to_string();
        let start = millis_to_utc(from.max(0), DateTime::<Utc>::UNIX_EPOCH);
        let end = millis_to_utc(to, DateTime::<Utc>::MAX_UTC);

        let records = sqlx::query_as::<_, (DateTime<Utc>, Decimal, Decimal, Decimal, Decimal, Decimal)>(
            &format!(
                r#"
                SELECT time, open, high, low, close, volume
                FROM "{}"
                WHERE bucket = $1 AND time >= $2 AND time <= $3
                ORDER BY time ASC
                "#,
                table
            ),
        )
        .bind(&bucket)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        Ok(records
            .into_iter()
            .map(|r| Bar {
                timestamp: r.0.timestamp_millis(),
                open: r.1,
                high: r.2,
                low: r.3,
                close: r.4,
                volume: r.5,
            })
            .collect())
    }
}
