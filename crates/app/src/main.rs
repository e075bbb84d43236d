mod cli;
mod logging;
mod settings;

use clap::Parser;
use cli::Cli;
use collector_core::common::{Cursor, SeriesIdentity};
use collector_feed::okx::OkxProvider;
use collector_pipeline::{IngestionPipeline, RateLimiter, RetryPolicy, RunOutcome, shutdown_channel};
use collector_store::open_store;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

// 启动阶段（配置、连接、参数）失败
const STARTUP_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            eprintln!("bars-collector: {}", e);
            ExitCode::from(STARTUP_FAILURE)
        }
    }
}

/// # Summary
/// 应用装配入口。
///
/// # Logic
/// 1. 加载配置并初始化日志。
/// 2. 实例化基础设施层（存储、数据源、限流器）。
/// 3. 注册 Ctrl-C 处理，触发协作式关闭。
/// 4. 运行流水线并输出报告。
async fn run(cli: Cli) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let app_config = settings::load(&cli.config)?;
    let _log_guard = logging::init(&app_config.logging)?;
    info!(config = %cli.config.display(), "bars-collector starting");

    let series = SeriesIdentity::new(cli.instrument.clone(), cli.bar)?;

    // 基础设施层
    let store = open_store(&app_config.database).await?;
    let source = Arc::new(OkxProvider::new(&app_config.upstream)?);
    let limiter = Arc::new(RateLimiter::from_config(&app_config.limiter)?);
    let retry = RetryPolicy::from_config(&app_config.retry);
    info!(
        series = %series,
        backend = ?app_config.database.backend,
        rate = limiter.rate(),
        burst = limiter.burst(),
        max_attempts = retry.max_attempts,
        "infrastructure ready"
    );

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                trigger.trigger();
            }
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
        }
    });

    let pipeline = IngestionPipeline::new(source, store, limiter, shutdown)
        .with_retry(retry)
        .with_page_size(app_config.upstream.page_size);
    let report = pipeline.run(&series, cli.start_cursor()).await;

    info!(
        series = %report.series,
        outcome = ?report.outcome,
        pages = report.pages,
        bars = report.bars_persisted,
        inserted = report.rows_inserted,
        last_cursor = %report.last_cursor,
        "run finished"
    );
    if let (RunOutcome::Failed | RunOutcome::Cancelled, Cursor::Before(ts)) = (report.outcome, report.last_cursor) {
        info!("resume with: bars-collector {} {} --after {}", cli.instrument, cli.bar, ts);
    }

    Ok(report.outcome)
}
