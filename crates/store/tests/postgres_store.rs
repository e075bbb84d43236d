use collector_core::common::{SeriesIdentity, TimeFrame};
use collector_core::store::port::SeriesStore;
use collector_core::testing::descending_bars;
use collector_store::postgres::PgSeriesStore;
use sqlx::postgres::PgPoolOptions;

/// # Summary
/// PostgreSQL 后端的幂等写入测试。
///
/// # Logic
/// 1. 连接 `COLLECTOR_TEST_PG_URL` 指向的数据库（需提前准备，默认忽略）。
/// 2. 以随机标的名创建分区表，写入同一页两次。
/// 3. 断言第二次写入新增 0 行，读取结果与第一次一致。
#[tokio::test]
#[ignore = "requires a running PostgreSQL at COLLECTOR_TEST_PG_URL"]
async fn test_pg_idempotent_page_write() {
    let url = std::env::var("COLLECTOR_TEST_PG_URL").expect("COLLECTOR_TEST_PG_URL not set");
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await.unwrap();
    let store = PgSeriesStore::from_pool(pool.clone(), false);

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    let series = SeriesIdentity::new(format!("TEST-{}", nanos), TimeFrame::Minute1).unwrap();
    store.ensure_partition(&series).await.unwrap();
    store.ensure_partition(&series).await.unwrap();

    let page = descending_bars(1_735_689_600_000, 50, 60_000);
    assert_eq!(store.write_page(&series, &page).await.unwrap(), 50);
    assert_eq!(store.write_page(&series, &page).await.unwrap(), 0);

    let stored = store.load_bars(&series, i64::MIN, i64::MAX).await.unwrap();
    assert_eq!(stored.len(), 50);
    assert_eq!(stored[49], page[0]);

    sqlx::query(&format!(
        r#"DROP TABLE "{}""#,
        PgSeriesStore::table_name(series.partition())
    ))
    .execute(&pool)
    .await
    .unwrap();
}
