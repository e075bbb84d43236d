use async_trait::async_trait;
use collector_core::common::{Cursor, SeriesIdentity};
use collector_core::config::UpstreamConfig;
use collector_core::market::entity::{Bar, Page};
use collector_core::market::error::MarketError;
use collector_core::market::port::{MarketDataProvider, check_page_limit};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

// 错误响应体写入错误信息时保留的最大字符数
const MAX_ERROR_BODY_CHARS: usize = 512;

/// # Summary
/// OKX 历史 K 线数据源实现。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯。
/// - 超出 `max_page_size` 的页大小直接拒绝，不做截断。
#[derive(Clone)]
pub struct OkxProvider {
    /// 内部使用的 HTTP 客户端
    client: Client,
    /// history-candles 端点地址
    base_url: String,
    /// 上游单页硬上限
    max_page_size: usize,
}

impl OkxProvider {
    /// # Summary
    /// 根据上游配置创建 OkxProvider。
    ///
    /// # Logic
    /// 1. 安装 rustls 的 ring 加密后端（已安装则跳过）。
    /// 2. 按配置设置请求超时并初始化 reqwest 客户端。
    ///
    /// # Arguments
    /// * `config`: 上游配置。
    ///
    /// # Returns
    /// 成功返回 OkxProvider，客户端构建失败返回 `MarketError::InvalidRequest`。
    pub fn new(config: &UpstreamConfig) -> Result<Self, MarketError> {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MarketError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            max_page_size: config.max_page_size,
        })
    }
}

/// # Summary
/// OKX API 响应信封。
///
/// # Invariants
/// - `code == "0"` 表示成功，其余均为业务错误。
/// - `data` 每行依次为 `[ts, o, h, l, c, vol, ...]`，全部为字符串。
#[derive(Deserialize, Debug)]
struct OkxEnvelope {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<Vec<String>>,
}

/// # Summary
/// 将 OKX 响应体解析为一页 K 线。
///
/// # Logic
/// 1. 反序列化信封，失败视为解析错误。
/// 2. `code` 非 "0" 时返回携带原始消息的业务错误。
/// 3. 逐行转换，任一行失败整页失败。
/// 4. 校验从新到旧的顺序并推导下一页游标。
///
/// # Arguments
/// * `body`: 原始响应体。
///
/// # Returns
/// 成功返回 Page（无数据时为空页）。
pub fn parse_envelope(body: &[u8]) -> Result<Page, MarketError> {
    let envelope: OkxEnvelope = serde_json::from_slice(body)
        .map_err(|e| MarketError::Parse(format!("invalid envelope: {}", e)))?;

    if envelope.code != "0" {
        return Err(MarketError::Api {
            code: envelope.code,
            message: envelope.msg,
        });
    }

    let bars = envelope
        .data
        .iter()
        .enumerate()
        .map(|(i, row)| parse_row(i, row))
        .collect::<Result<Vec<_>, _>>()?;

    Page::from_newest_first(bars)
}

fn parse_row(index: usize, row: &[String]) -> Result<Bar, MarketError> {
    if row.len() < 6 {
        return Err(MarketError::Parse(format!(
            "row {}: expected at least 6 fields, got {}",
            index,
            row.len()
        )));
    }

    let timestamp = row[0].trim().parse::<i64>().map_err(|e| {
        MarketError::Parse(format!("row {}: field ts: {:?}: {}", index, row[0], e))
    })?;

    let field = |pos: usize, name: &str| -> Result<Decimal, MarketError> {
        parse_decimal(&row[pos]).ok_or_else(|| {
            MarketError::Parse(format!("row {}: field {}: {:?} is not a number", index, name, row[pos]))
        })
    };

    Ok(Bar {
        timestamp,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

// 上游偶尔以科学计数法返回极小的成交量
fn parse_decimal(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn truncate_body(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect()
}

#[async_trait]
impl MarketDataProvider for OkxProvider {
    fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// # Summary
    /// 从 OKX 抓取游标之前的一页历史 K 线。
    ///
    /// # Logic
    /// 1. 校验页大小。
    /// 2. 构建 instId / bar / limit / after 查询参数，`Latest` 时省略 after。
    /// 3. 发起请求：传输失败为 Network，非成功状态码为 Http。
    /// 4. 解析信封与数据行。
    async fn fetch_page(
        &self,
        series: &SeriesIdentity,
        limit: usize,
        cursor: Cursor,
    ) -> Result<Page, MarketError> {
        check_page_limit(limit, self.max_page_size)?;

        let mut query = vec![
            ("instId", series.instrument().to_string()),
            ("bar", series.timeframe().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(ts) = cursor.upper_bound() {
            query.push(("after", ts.to_string()));
        }

        let resp = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(MarketError::Http {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let page = parse_envelope(&body)?;
        debug!(series = %series, %cursor, bars = page.len(), "fetched page");
        Ok(page)
    }
}
