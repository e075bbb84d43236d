use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod cursor;
pub mod series;

pub use cursor::Cursor;
pub use series::{PartitionName, SeriesError, SeriesIdentity};

/// # Summary
/// 错误分类，决定流水线对一次失败的处理方式。
///
/// # Invariants
/// - `Transient` 可重试；`Fatal` 立即终止；`Cancelled` 代表协作式关闭，不属于应用错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    // 网络抖动、超时、存储暂不可用
    Transient,
    // 数据损坏、业务错误、重试耗尽
    Fatal,
    // 外部关闭信号
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Fatal => write!(f, "fatal"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// # Summary
/// K 线时间周期枚举，定义单根 K 线覆盖的时间跨度。
///
/// # Invariants
/// - 文本形式区分大小写：`1m` 为一分钟，`1M` 为一个月。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeFrame {
    // 1秒
    Second1,
    // 1分钟
    Minute1,
    // 3分钟
    Minute3,
    // 5分钟
    Minute5,
    // 15分钟
    Minute15,
    // 30分钟
    Minute30,
    // 1小时
    Hour1,
    // 2小时
    Hour2,
    // 4小时
    Hour4,
    // 6小时
    Hour6,
    // 12小时
    Hour12,
    // 1日
    Day1,
    // 1周
    Week1,
    // 1月
    Month1,
}

impl FromStr for TimeFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1s" => Ok(TimeFrame::Second1),
            "1m" | "1min" | "1 minute" => Ok(TimeFrame::Minute1),
            "3m" => Ok(TimeFrame::Minute3),
            "5m" => Ok(TimeFrame::Minute5),
            "15m" => Ok(TimeFrame::Minute15),
            "30m" => Ok(TimeFrame::Minute30),
            "1H" | "1h" => Ok(TimeFrame::Hour1),
            "2H" | "2h" => Ok(TimeFrame::Hour2),
            "4H" | "4h" => Ok(TimeFrame::Hour4),
            "6H" | "6h" => Ok(TimeFrame::Hour6),
            "12H" | "12h" => Ok(TimeFrame::Hour12),
            "1D" | "1d" => Ok(TimeFrame::Day1),
            "1W" | "1w" => Ok(TimeFrame::Week1),
            "1M" => Ok(TimeFrame::Month1),
            _ => Err(format!("Unknown TimeFrame: {}", s)),
        }
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeFrame::Second1 => "1s",
            TimeFrame::Minute1 => "1m",
            TimeFrame::Minute3 => "3m",
            TimeFrame::Minute5 => "5m",
            TimeFrame::Minute15 => "15m",
            TimeFrame::Minute30 => "30m",
            TimeFrame::Hour1 => "1H",
            TimeFrame::Hour2 => "2H",
            TimeFrame::Hour4 => "4H",
            TimeFrame::Hour6 => "6H",
            TimeFrame::Hour12 => "12H",
            TimeFrame::Day1 => "1D",
            TimeFrame::Week1 => "1W",
            TimeFrame::Month1 => "1M",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_round_trips_through_wire_text() {
        for tf in [
            TimeFrame::Second1,
            TimeFrame::Minute1,
            TimeFrame::Minute15,
            TimeFrame::Hour4,
            TimeFrame::Day1,
            TimeFrame::Month1,
        ] {
            assert_eq!(tf.to_string().parse::<TimeFrame>(), Ok(tf));
        }
    }

    #[test]
    fn test_minute_and_month_are_case_sensitive() {
        assert_eq!("1m".parse::<TimeFrame>(), Ok(TimeFrame::Minute1));
        assert_eq!("1M".parse::<TimeFrame>(), Ok(TimeFrame::Month1));
        assert_eq!("1 minute".parse::<TimeFrame>(), Ok(TimeFrame::Minute1));
        assert!("7m".parse::<TimeFrame>().is_err());
    }
}
