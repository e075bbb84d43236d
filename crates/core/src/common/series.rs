use super::TimeFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// # Summary
/// 序列身份相关错误。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
    /// 标的代码规范化后为空，无法作为分区名
    #[error("Instrument id {0:?} has no alphanumeric characters")]
    EmptyPartition(String),
}

/// # Summary
/// 物理分区名，由标的代码规范化而来，可安全用作表名或文件名。
///
/// # Invariants
/// - 仅包含 `[a-z0-9_]`，不以 `_` 开头或结尾，且不含连续的 `_`。
/// - 同一输入永远得到同一输出。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionName(String);

impl PartitionName {
    /// # Summary
    /// 将标的代码规范化为分区名。
    ///
    /// # Logic
    /// 1. ASCII 字母转小写，ASCII 数字保留。
    /// 2. 其余字符（连字符、斜杠、空格、非 ASCII 等）的连续片段折叠为单个 `_`。
    /// 3. 去掉首尾的 `_`。
    ///
    /// # Arguments
    /// * `instrument`: 原始标的代码，例如 `BTC-USD-SWAP`。
    ///
    /// # Returns
    /// 成功返回分区名；若不含任何字母数字则返回 `SeriesError::EmptyPartition`。
    pub fn from_instrument(instrument: &str) -> Result<Self, SeriesError> {
        let mut out = String::with_capacity(instrument.len());
        let mut pending_sep = false;

        for ch in instrument.chars() {
            if ch.is_ascii_alphanumeric() {
                if pending_sep && !out.is_empty() {
                    out.push('_');
                }
                pending_sep = false;
                out.push(ch.to_ascii_lowercase());
            } else {
                pending_sep = true;
            }
        }

        if out.is_empty() {
            return Err(SeriesError::EmptyPartition(instrument.to_string()));
        }
        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Summary
/// 逻辑序列身份：一个标的在一个周期上的 K 线流。
///
/// # Invariants
/// - `partition` 在构造时由 `instrument` 推导并固定，存储层只使用它。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesIdentity {
    // 上游使用的原始标的代码，例如 BTC-USD
    instrument: String,
    // K 线周期
    timeframe: TimeFrame,
    // 物理分区名
    partition: PartitionName,
}

impl SeriesIdentity {
    pub fn new(instrument: impl Into<String>, timeframe: TimeFrame) -> Result<Self, SeriesError> {
        let instrument = instrument.into();
        let partition = PartitionName::from_instrument(&instrument)?;
        Ok(Self {
            instrument,
            timeframe,
            partition,
        })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    pub fn partition(&self) -> &PartitionName {
        &self.partition
    }
}

impl std::fmt::Display for SeriesIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.instrument, self.timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hyphenated_instrument_normalises() {
        let name = PartitionName::from_instrument("BTC-USD").unwrap();
        assert_eq!(name.as_str(), "btc_usd");
    }

    #[test]
    fn test_separator_runs_collapse_and_edges_trim() {
        let name = PartitionName::from_instrument("  eth//usdt--swap_ ").unwrap();
        assert_eq!(name.as_str(), "eth_usdt_swap");
    }

    #[test]
    fn test_non_ascii_is_treated_as_separator() {
        let name = PartitionName::from_instrument("BTC·USD").unwrap();
        assert_eq!(name.as_str(), "btc_usd");
    }

    #[test]
    fn test_empty_identity_is_rejected() {
        assert_eq!(
            PartitionName::from_instrument("--/"),
            Err(SeriesError::EmptyPartition("--/".into()))
        );
    }

    #[test]
    fn test_realistic_instruments_do_not_collide() {
        let ids = [
            "BTC-USD",
            "BTC-USDT",
            "BTC-USDC",
            "BTC-USD-SWAP",
            "BTC-USDT-SWAP",
            "BTC-USD-250328",
            "BTC-USD-250627",
            "BTC-USD-250627-100000-C",
            "BTC-USD-250627-100000-P",
            "ETH-BTC",
            "ETH-USD",
            "ETH-USDT",
            "ETHW-USDT",
            "SOL-USDT",
            "1INCH-USDT",
            "AAPL",
            "BRK.B",
            "BRKB",
        ];
        let names: HashSet<String> = ids
            .iter()
            .map(|id| PartitionName::from_instrument(id).unwrap().to_string())
            .collect();
        // BRK.B 与 BRKB 不同：前者为 brk_b
        assert_eq!(names.len(), ids.len());
    }

    #[test]
    fn test_series_identity_derives_partition_once() {
        let series = SeriesIdentity::new("BTC-USD", TimeFrame::Minute1).unwrap();
        assert_eq!(series.partition().as_str(), "btc_usd");
        assert_eq!(series.to_string(), "BTC-USD/1m");
    }
}
