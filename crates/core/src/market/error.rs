use crate::common::ErrorKind;
use thiserror::Error;

/// # Summary
/// 市场数据域错误枚举，处理网络、解析及上游业务错误。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 业务错误 (`Api`) 与传输错误 (`Network`) 不得混用。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    // 网络层错误：连接失败、超时、读取响应体失败
    #[error("Network error: {0}")]
    Network(String),
    // 非成功的 HTTP 状态码
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    // 上游在成功信封中返回的业务错误，消息原样保留
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },
    // 数据解析错误，如 JSON 格式不匹配或字段无法转换为数值
    #[error("Parse error: {0}")]
    Parse(String),
    // 请求参数不合法，例如 limit 超出上游上限
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl MarketError {
    /// # Summary
    /// 对错误进行分类。
    ///
    /// # Logic
    /// 1. 网络错误可重试。
    /// 2. HTTP 408/425/429 与 5xx 预期可自行恢复，可重试；其余状态码视为请求本身有误。
    /// 3. 业务错误、解析错误、参数错误均为致命错误。
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::Network(_) => ErrorKind::Transient,
            MarketError::Http { status, .. } => {
                if matches!(status, 408 | 425 | 429) || (500..600).contains(status) {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Fatal
                }
            }
            MarketError::Api { .. } | MarketError::Parse(_) | MarketError::InvalidRequest(_) => {
                ErrorKind::Fatal
            }
        }
    }
}
