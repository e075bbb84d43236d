use collector_core::common::{SeriesIdentity, TimeFrame};
use collector_core::market::entity::Bar;
use collector_core::store::error::StoreError;
use collector_core::store::port::SeriesStore;
use collector_core::testing::descending_bars;
use collector_store::sqlite::SqliteSeriesStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::tempdir;

const T0: i64 = 1_735_689_600_000; // 2025-01-01T00:00:00Z
const MINUTE: i64 = 60_000;

fn btc() -> SeriesIdentity {
    SeriesIdentity::new("BTC-USD", TimeFrame::Minute1).unwrap()
}

#[tokio::test]
async fn test_ensure_partition_is_idempotent_and_creates_file() {
    let tmp_dir = tempdir().expect("Failed to create temp dir");
    let store = SqliteSeriesStore::new(tmp_dir.path()).unwrap();
    let series = btc();

    store.ensure_partition(&series).await.unwrap();
    store.ensure_partition(&series).await.unwrap();

    // 验证物理路径 (应当在临时目录下)
    let db_file = tmp_dir.path().join("btc_usd.db");
    assert!(db_file.exists());
    assert_eq!(store.partition_path(series.partition()), db_file);
}

#[tokio::test]
async fn test_write_before_ensure_is_rejected() {
    let tmp_dir = tempdir().unwrap();
    let store = SqliteSeriesStore::new(tmp_dir.path()).unwrap();

    let err = store
        .write_page(&btc(), &descending_bars(T0, 3, MINUTE))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::PartitionMissing("btc_usd".into()));
}

#[tokio::test]
async fn test_rewrite_is_noop_and_first_write_wins() {
    let tmp_dir = tempdir().unwrap();
    let store = SqliteSeriesStore::new(tmp_dir.path()).unwrap();
    let series = btc();
    store.ensure_partition(&series).await.unwrap();

    let first = descending_bars(T0, 10, MINUTE);
    assert_eq!(store.write_page(&series, &first).await.unwrap(), 10);

    // 同一时间戳、不同价格的第二次写入
    let mut second = first.clone();
    for bar in second.iter_mut() {
        bar.close = dec!(1);
    }
    assert_eq!(store.write_page(&series, &second).await.unwrap(), 0);

    let stored = store.load_bars(&series, i64::MIN, i64::MAX).await.unwrap();
    assert_eq!(stored.len(), 10);
    let mut expected = first.clone();
    expected.reverse();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn test_boundary_overlap_is_deduplicated() {
    let tmp_dir = tempdir().unwrap();
    let store = SqliteSeriesStore::new(tmp_dir.path()).unwrap();
    let series = btc();
    store.ensure_partition(&series).await.unwrap();

    let newer = descending_bars(T0, 5, MINUTE);
    // 第二页首根与第一页末根重叠
    let older = descending_bars(T0 - 4 * MINUTE, 5, MINUTE);

    assert_eq!(store.write_page(&series, &newer).await.unwrap(), 5);
    assert_eq!(store.write_page(&series, &older).await.unwrap(), 4);
    assert_eq!(store.load_bars(&series, i64::MIN, i64::MAX).await.unwrap().len(), 9);
}

#[tokio::test]
async fn test_malformed_bar_rolls_back_whole_page() {
    let tmp_dir = tempdir().unwrap();
    let store = SqliteSeriesStore::new(tmp_dir.path()).unwrap();
    let series = btc();
    store.ensure_partition(&series).await.unwrap();

    // 前 3 根已执行插入后才遇到非法数据
    let mut page = descending_bars(T0, 4, MINUTE);
    page[3].high = dec!(1);
    page[3].low = dec!(2);

    let err = store.write_page(&series, &page).await.unwrap_err();
    assert!(matches!(err, StoreError::Malformed(_)));

    let stored = store.load_bars(&series, i64::MIN, i64::MAX).await.unwrap();
    assert!(stored.is_empty(), "partial page leaked: {:?}", stored);

    // 回滚后同一分区仍可正常写入
    assert_eq!(store.write_page(&series, &page[..3]).await.unwrap(), 3);
}

#[tokio::test]
async fn test_partitions_and_buckets_are_isolated() {
    let tmp_dir = tempdir().unwrap();
    let store = SqliteSeriesStore::new(tmp_dir.path()).unwrap();
    let btc_1m = btc();
    let btc_5m = SeriesIdentity::new("BTC-USD", TimeFrame::Minute5).unwrap();
    let eth_1m = SeriesIdentity::new("ETH-USD", TimeFrame::Minute1).unwrap();
    for s in [&btc_1m, &btc_5m, &eth_1m] {
        store.ensure_partition(s).await.unwrap();
    }

    store.write_page(&btc_1m, &descending_bars(T0, 7, MINUTE)).await.unwrap();

    // 同一时间戳在不同周期下是不同的行
    assert_eq!(
        store.write_page(&btc_5m, &descending_bars(T0, 2, 5 * MINUTE)).await.unwrap(),
        2
    );

    assert_eq!(store.load_bars(&btc_1m, i64::MIN, i64::MAX).await.unwrap().len(), 7);
    assert_eq!(store.load_bars(&btc_5m, i64::MIN, i64::MAX).await.unwrap().len(), 2);
    assert!(store.load_bars(&eth_1m, i64::MIN, i64::MAX).await.unwrap().is_empty());
    assert!(tmp_dir.path().join("eth_usd.db").exists());
}

#[tokio::test]
async fn test_load_range_is_inclusive_and_ascending() {
    let tmp_dir = tempdir().unwrap();
    let store = SqliteSeriesStore::new(tmp_dir.path()).unwrap();
    let series = btc();
    store.ensure_partition(&series).await.unwrap();
    store.write_page(&series, &descending_bars(T0, 10, MINUTE)).await.unwrap();

    let window = store
        .load_bars(&series, T0 - 5 * MINUTE, T0 - 2 * MINUTE)
        .await
        .unwrap();
    let ts: Vec<i64> = window.iter().map(|b| b.timestamp).collect();
    assert_eq!(
        ts,
        vec![T0 - 5 * MINUTE, T0 - 4 * MINUTE, T0 - 3 * MINUTE, T0 - 2 * MINUTE]
    );
}

#[tokio::test]
async fn test_concurrent_overlapping_writes_same_series() {
    let tmp_dir = tempdir().unwrap();
    let store = Arc::new(SqliteSeriesStore::new(tmp_dir.path()).unwrap());
    let series = btc();
    store.ensure_partition(&series).await.unwrap();

    // 8 个任务写入相互重叠的窗口，覆盖 T0 .. T0-99min
    let mut handles = Vec::new();
    for i in 0..8i64 {
        let store = store.clone();
        let series = series.clone();
        handles.push(tokio::spawn(async move {
            let bars = descending_bars(T0 - i * 10 * MINUTE, 30, MINUTE);
            store.write_page(&series, &bars).await
        }));
    }

    let mut inserted = 0;
    for h in handles {
        inserted += h.await.unwrap().unwrap();
    }

    let stored = store.load_bars(&series, i64::MIN, i64::MAX).await.unwrap();
    assert_eq!(stored.len(), 100);
    assert_eq!(inserted, 100);
    assert!(stored.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[tokio::test]
async fn test_rows_survive_reopen() {
    let tmp_dir = tempdir().unwrap();
    let series = btc();
    {
        let store = SqliteSeriesStore::new(tmp_dir.path()).unwrap();
        store.ensure_partition(&series).await.unwrap();
        store.write_page(&series, &descending_bars(T0, 4, MINUTE)).await.unwrap();
    }

    let store = SqliteSeriesStore::new(tmp_dir.path()).unwrap();
    store.ensure_partition(&series).await.unwrap();
    let stored: Vec<Bar> = store.load_bars(&series, i64::MIN, i64::MAX).await.unwrap();
    assert_eq!(stored.len(), 4);
    assert_eq!(store.write_page(&series, &descending_bars(T0, 4, MINUTE)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_dropped_write_is_all_or_nothing() {
    let tmp_dir = tempdir().unwrap();
    let store = SqliteSeriesStore::new(tmp_dir.path()).unwrap();
    let series = btc();
    store.ensure_partition(&series).await.unwrap();

    // 在事务进行中丢弃写入 future
    let bars = descending_bars(T0, 2_000, MINUTE);
    let dropped = tokio::time::timeout(std::time::Duration::from_millis(1), store.write_page(&series, &bars)).await;

    let stored = store.load_bars(&series, 0, i64::MAX).await.unwrap();
    match dropped {
        Ok(res) => {
            assert_eq!(res.unwrap(), 2_000);
            assert_eq!(stored.len(), 2_000);
        }
        Err(_) => assert!(stored.is_empty(), "partial page visible: {} rows", stored.len()),
    }

    // 分区仍可继续写入
    assert_eq!(store.write_page(&series, &bars[..10]).await.unwrap(), if stored.is_empty() { 10 } else { 0 });
}
