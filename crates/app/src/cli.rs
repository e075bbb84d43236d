use clap::Parser;
use collector_core::common::{Cursor, TimeFrame};
use std::path::PathBuf;

/// 将一个标的的历史 K 线向过去逐页摄取到分区存储中。
#[derive(Debug, Parser)]
#[command(name = "bars-collector", version, about)]
pub struct Cli {
    /// 标的代码，例如 BTC-USD
    pub instrument: String,

    /// K 线周期（1m、5m、1H、1D ...）
    #[arg(default_value = "1m")]
    pub bar: TimeFrame,

    /// YAML 配置文件路径
    #[arg(long, default_value = "db_config.yml")]
    pub config: PathBuf,

    /// 只摄取早于该毫秒时间戳的 K 线，用于从上次失败处继续
    #[arg(long, value_name = "MILLIS")]
    pub after: Option<i64>,
}

impl Cli {
    pub fn start_cursor(&self) -> Cursor {
        self.after.map(Cursor::Before).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["bars-collector", "BTC-USD"]).unwrap();
        assert_eq!(cli.instrument, "BTC-USD");
        assert_eq!(cli.bar, TimeFrame::Minute1);
        assert_eq!(cli.config, PathBuf::from("db_config.yml"));
        assert_eq!(cli.start_cursor(), Cursor::Latest);
    }

    #[test]
    fn test_resume_and_bar() {
        let cli = Cli::try_parse_from([
            "bars-collector",
            "ETH-USDT",
            "1H",
            "--config",
            "/etc/collector.yml",
            "--after",
            "1735689600000",
        ])
        .unwrap();
        assert_eq!(cli.bar, TimeFrame::Hour1);
        assert_eq!(cli.start_cursor(), Cursor::Before(1_735_689_600_000));
    }

    #[test]
    fn test_unknown_bar_is_rejected() {
        assert!(Cli::try_parse_from(["bars-collector", "BTC-USD", "7m"]).is_err());
        assert!(Cli::try_parse_from(["bars-collector"]).is_err());
    }
}
